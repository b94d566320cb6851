// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Double-buffered entry storage.
//!
//! Producers append to the active sequence while the previously active
//! sequence is handed to I/O, so no critical section ever spans disk access.
//! The swap itself is a pointer exchange under a single mutex.

use crate::entry::LogEntry;
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct BufferState {
    active: Vec<LogEntry>,
    drain: Vec<LogEntry>,
    active_bytes: usize,
    drain_outstanding: bool,
}

pub struct BatchBuffer {
    state: Mutex<BufferState>,
    // Read on the hot path, updated by reconfiguration.
    max_entries: AtomicUsize,
}

impl BatchBuffer {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                active: Vec::new(),
                drain: Vec::new(),
                active_bytes: 0,
                drain_outstanding: false,
            }),
            max_entries: AtomicUsize::new(max_entries),
        }
    }

    /// Append to the active sequence. Returns `false` without mutating
    /// anything if the active sequence is at capacity. This is the pure
    /// backpressure signal; it never panics or errors.
    pub fn add(&self, entry: LogEntry) -> bool {
        let max = self.max_entries.load(Ordering::Acquire);

        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        if state.active.len() >= max {
            return false;
        }
        state.active_bytes += entry.serialized_size();
        state.active.push(entry);
        true
    }

    /// Exchange the active and drain roles and hand out the drained
    /// sequence. O(1): two pointer swaps, no copying. Returns `None` if the
    /// active sequence is empty or a previous drain has not been released
    /// yet (at most one drain is outstanding at a time).
    pub fn swap(&self) -> Option<Vec<LogEntry>> {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        if state.active.is_empty() || state.drain_outstanding {
            return None;
        }

        let BufferState { active, drain, .. } = &mut *state;
        mem::swap(active, drain);
        state.active_bytes = 0;
        state.drain_outstanding = true;
        Some(mem::take(&mut state.drain))
    }

    /// Release the drain slot once the handed-out sequence reached the
    /// writer pool.
    pub fn clear_drain(&self) {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        state.drain_outstanding = false;
    }

    pub fn active_count(&self) -> usize {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        state.active.len()
    }

    pub fn active_bytes(&self) -> usize {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        state.active_bytes
    }

    /// Runtime reconfiguration hook. Applies to subsequent `add` calls only;
    /// entries already buffered are never migrated or truncated.
    pub fn set_capacity(&self, max_entries: usize) {
        self.max_entries.store(max_entries, Ordering::Release);
    }
}
