// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline self-observability.
//!
//! Counters are plain atomics so the hot path and the writer pool can record
//! without sharing a lock; monitoring consumers read a consistent-enough
//! [`MetricsSnapshot`] at any time.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct BatchMetrics {
    total_entries: AtomicU64,
    total_batches: AtomicU64,
    total_bytes_written: AtomicU64,
    write_time_micros: AtomicU64,
    buffer_overflows: AtomicU64,
    memory_pressure_events: AtomicU64,
    emergency_flushes: AtomicU64,
    failed_writes: AtomicU64,
    peak_buffer_size: AtomicU64,
    // Stored in KiB so the peak gauge stays a single atomic.
    peak_memory_kb: AtomicU64,
    started_at: Instant,
}

/// Immutable metrics view with derived rates, as exposed to monitoring and
/// health consumers.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_entries: u64,
    pub total_batches: u64,
    pub total_bytes_written: u64,
    pub average_batch_size: f64,
    pub throughput_per_sec: f64,
    pub io_efficiency_mb_per_sec: f64,
    pub buffer_overflows: u64,
    pub memory_pressure_events: u64,
    pub emergency_flushes: u64,
    pub failed_writes: u64,
    pub peak_buffer_size: u64,
    pub peak_memory_mb: f64,
    pub uptime_seconds: f64,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            total_entries: AtomicU64::new(0),
            total_batches: AtomicU64::new(0),
            total_bytes_written: AtomicU64::new(0),
            write_time_micros: AtomicU64::new(0),
            buffer_overflows: AtomicU64::new(0),
            memory_pressure_events: AtomicU64::new(0),
            emergency_flushes: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            peak_buffer_size: AtomicU64::new(0),
            peak_memory_kb: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record one completed batch write.
    pub fn record_batch(&self, count: usize, duration: Duration, bytes: u64) {
        self.total_entries.fetch_add(count as u64, Ordering::Relaxed);
        self.total_batches.fetch_add(1, Ordering::Relaxed);
        self.total_bytes_written.fetch_add(bytes, Ordering::Relaxed);
        self.write_time_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_overflow(&self) {
        self.buffer_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pressure(&self) {
        self.memory_pressure_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_emergency_flush(&self) {
        self.emergency_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Keep running maxima for buffer occupancy and resident memory.
    pub fn update_peak(&self, buffer_size: usize, memory_mb: f64) {
        self.peak_buffer_size
            .fetch_max(buffer_size as u64, Ordering::Relaxed);
        let memory_kb = (memory_mb * 1024.0) as u64;
        self.peak_memory_kb.fetch_max(memory_kb, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_entries = self.total_entries.load(Ordering::Relaxed);
        let total_batches = self.total_batches.load(Ordering::Relaxed);
        let total_bytes_written = self.total_bytes_written.load(Ordering::Relaxed);
        let uptime = self.started_at.elapsed();
        let uptime_seconds = uptime.as_secs_f64();

        let average_batch_size = if total_batches > 0 {
            total_entries as f64 / total_batches as f64
        } else {
            0.0
        };
        let throughput_per_sec = if uptime_seconds > 0.0 {
            total_entries as f64 / uptime_seconds
        } else {
            0.0
        };
        let io_efficiency_mb_per_sec = if uptime_seconds > 0.0 {
            (total_bytes_written as f64 / (1024.0 * 1024.0)) / uptime_seconds
        } else {
            0.0
        };

        MetricsSnapshot {
            total_entries,
            total_batches,
            total_bytes_written,
            average_batch_size,
            throughput_per_sec,
            io_efficiency_mb_per_sec,
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            memory_pressure_events: self.memory_pressure_events.load(Ordering::Relaxed),
            emergency_flushes: self.emergency_flushes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            peak_buffer_size: self.peak_buffer_size.load(Ordering::Relaxed),
            peak_memory_mb: self.peak_memory_kb.load(Ordering::Relaxed) as f64 / 1024.0,
            uptime_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_batch_accumulates() {
        let metrics = BatchMetrics::new();
        metrics.record_batch(10, Duration::from_millis(5), 1_000);
        metrics.record_batch(20, Duration::from_millis(5), 3_000);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_entries, 30);
        assert_eq!(snap.total_batches, 2);
        assert_eq!(snap.total_bytes_written, 4_000);
        assert!((snap.average_batch_size - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_event_counters() {
        let metrics = BatchMetrics::new();
        metrics.record_overflow();
        metrics.record_overflow();
        metrics.record_pressure();
        metrics.record_emergency_flush();
        metrics.record_failed_write();

        let snap = metrics.snapshot();
        assert_eq!(snap.buffer_overflows, 2);
        assert_eq!(snap.memory_pressure_events, 1);
        assert_eq!(snap.emergency_flushes, 1);
        assert_eq!(snap.failed_writes, 1);
    }

    #[test]
    fn test_peaks_are_monotonic() {
        let metrics = BatchMetrics::new();
        metrics.update_peak(50, 100.0);
        metrics.update_peak(30, 200.0);
        metrics.update_peak(80, 150.0);

        let snap = metrics.snapshot();
        assert_eq!(snap.peak_buffer_size, 80);
        assert!((snap.peak_memory_mb - 200.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan_rates() {
        let snap = BatchMetrics::new().snapshot();
        assert_eq!(snap.average_batch_size, 0.0);
        assert!(snap.throughput_per_sec.is_finite());
        assert!(snap.io_efficiency_mb_per_sec.is_finite());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = BatchMetrics::new();
        metrics.record_batch(3, Duration::from_millis(1), 300);
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"total_entries\":3"));
        assert!(json.contains("\"uptime_seconds\""));
    }
}
