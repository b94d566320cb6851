// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process resident-memory classification.
//!
//! The monitor holds no history: every query is a pure function of current
//! resident memory against the configured budget. The probe is a seam so
//! tests can drive the pressure and emergency paths deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current resident-memory reading, in MiB.
pub trait MemoryProbe: Send + Sync {
    fn current_mb(&self) -> f64;
}

/// Default probe: resident set size from the `VmRSS` line of
/// `/proc/self/status`. The kernel reports that value in kB regardless of
/// page size, so the reading is correct on 16K/64K-page hosts too.
#[derive(Debug, Default)]
pub struct ProcStatusProbe;

impl MemoryProbe for ProcStatusProbe {
    #[cfg(target_os = "linux")]
    fn current_mb(&self) -> f64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|content| resident_kb(&content))
            .map(|kb| kb as f64 / 1024.0)
            .unwrap_or(0.0)
    }

    #[cfg(not(target_os = "linux"))]
    fn current_mb(&self) -> f64 {
        // No portable fallback; classification degrades to "never under
        // pressure" on non-Linux hosts.
        0.0
    }
}

/// Parse the `VmRSS` field of status-file content. Line format:
/// "VmRSS:     2048 kB".
#[cfg(target_os = "linux")]
fn resident_kb(content: &str) -> Option<u64> {
    let line = content.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

/// Stateless queries of current process memory against the configured
/// budget.
pub struct MemoryMonitor {
    probe: Arc<dyn MemoryProbe>,
    max_memory_mb: AtomicU64,
}

impl MemoryMonitor {
    pub fn new(max_memory_mb: u64) -> Self {
        Self::with_probe(max_memory_mb, Arc::new(ProcStatusProbe))
    }

    pub fn with_probe(max_memory_mb: u64, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            probe,
            max_memory_mb: AtomicU64::new(max_memory_mb),
        }
    }

    /// Current resident memory of the process in MiB.
    pub fn current_mb(&self) -> f64 {
        self.probe.current_mb()
    }

    /// True once usage crosses `threshold × max_memory_mb`.
    pub fn is_pressure(&self, threshold: f64) -> bool {
        self.exceeds(threshold)
    }

    /// True once usage crosses the emergency fraction of the budget.
    pub fn is_emergency(&self, threshold: f64) -> bool {
        self.exceeds(threshold)
    }

    /// Runtime reconfiguration hook.
    pub fn set_max_memory_mb(&self, max_memory_mb: u64) {
        self.max_memory_mb.store(max_memory_mb, Ordering::Release);
    }

    fn exceeds(&self, threshold: f64) -> bool {
        let budget = self.max_memory_mb.load(Ordering::Acquire) as f64;
        self.current_mb() >= threshold * budget
    }
}
