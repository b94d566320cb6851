// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The batching orchestrator.
//!
//! [`BatchLogProcessor`] owns the flush loop, the writer pool, and the
//! admission decision. Producers call [`BatchLogProcessor::add_entry`] from
//! any task or thread; the call is O(1), never blocks on I/O, and signals
//! backpressure through its boolean return. One background flush loop swaps
//! the double buffer and hands drained batches to a bounded pool of writer
//! workers so a slow sink cannot stall buffer swapping.
//!
//! The processor is a cheap-to-clone handle: the host constructs one at
//! startup, keeps it for the `stop` call, and hands clones to every ingress
//! adapter. There is no ambient registry.

use crate::buffer::BatchBuffer;
use crate::config::{BatchConfig, DurabilityMode};
use crate::entry::LogEntry;
use crate::errors::PipelineError;
use crate::memory::{MemoryMonitor, MemoryProbe, ProcStatusProbe};
use crate::metrics::{BatchMetrics, MetricsSnapshot};
use crate::sink::{FileSink, Sink};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const STATE_STOPPED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_RUNNING: u8 = 2;
const STATE_STOPPING: u8 = 3;

/// Lifecycle state of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Health probe result for monitoring consumers.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineHealth {
    pub active_entries: usize,
    pub active_bytes: usize,
    pub memory_pressure: bool,
    pub emergency: bool,
}

struct RuntimeState {
    cancel: CancellationToken,
    batch_tx: mpsc::Sender<Vec<LogEntry>>,
    tasks: Vec<JoinHandle<()>>,
}

struct Inner {
    config: RwLock<Arc<BatchConfig>>,
    buffer: BatchBuffer,
    metrics: BatchMetrics,
    memory: MemoryMonitor,
    sink: Arc<dyn Sink>,
    flush_notify: Notify,
    // Coalesces emergency requests until the flush loop wakes.
    emergency_pending: AtomicBool,
    // Rearmed when memory drops back below the emergency line, so the
    // emergency_flushes counter moves once per contiguous episode.
    in_emergency: AtomicBool,
    state: AtomicU8,
    runtime: Mutex<Option<RuntimeState>>,
}

#[derive(Clone)]
pub struct BatchLogProcessor {
    inner: Arc<Inner>,
}

impl BatchLogProcessor {
    /// Build a processor writing to a [`FileSink`] at `config.log_path`.
    pub fn new(config: BatchConfig) -> Self {
        let sink = Arc::new(FileSink::new(&config.log_path));
        Self::with_parts(config, sink, Arc::new(ProcStatusProbe))
    }

    /// Build a processor with an explicit sink and memory probe.
    pub fn with_parts(
        config: BatchConfig,
        sink: Arc<dyn Sink>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Self {
        let buffer = BatchBuffer::new(config.max_buffer_size);
        let memory = MemoryMonitor::with_probe(config.max_memory_mb, probe);
        Self {
            inner: Arc::new(Inner {
                config: RwLock::new(Arc::new(config)),
                buffer,
                metrics: BatchMetrics::new(),
                memory,
                sink,
                flush_notify: Notify::new(),
                emergency_pending: AtomicBool::new(false),
                in_emergency: AtomicBool::new(false),
                state: AtomicU8::new(STATE_STOPPED),
                runtime: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ProcessorState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_STARTING => ProcessorState::Starting,
            STATE_RUNNING => ProcessorState::Running,
            STATE_STOPPING => ProcessorState::Stopping,
            _ => ProcessorState::Stopped,
        }
    }

    fn current_config(&self) -> Arc<BatchConfig> {
        #[allow(clippy::expect_used)]
        Arc::clone(&self.inner.config.read().expect("lock poisoned"))
    }

    /// Start the flush loop, the writer pool, and the metrics-report loop.
    /// Idempotent: a second call while running is a no-op.
    pub async fn start(&self) -> Result<(), PipelineError> {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_STOPPED,
                STATE_STARTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        let config = self.current_config();
        let cancel = CancellationToken::new();
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<LogEntry>>(config.writer_workers * 2);
        let batch_rx = Arc::new(Mutex::new(batch_rx));

        let mut tasks = Vec::with_capacity(config.writer_workers + 2);
        for worker_id in 0..config.writer_workers {
            let processor = self.clone();
            let rx = Arc::clone(&batch_rx);
            tasks.push(tokio::spawn(async move {
                processor.writer_worker(worker_id, rx).await;
            }));
        }

        let processor = self.clone();
        let loop_tx = batch_tx.clone();
        let loop_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            processor.flush_loop(loop_tx, loop_cancel).await;
        }));

        // Always spawned; the loop checks enable_metrics on every tick so
        // `configure` can toggle reporting without a restart.
        let processor = self.clone();
        let report_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            processor.metrics_report_loop(report_cancel).await;
        }));

        *self.inner.runtime.lock().await = Some(RuntimeState {
            cancel,
            batch_tx,
            tasks,
        });
        self.inner.state.store(STATE_RUNNING, Ordering::Release);
        debug!("Batch log processor started");
        Ok(())
    }

    /// Stop the processor: signal shutdown, let the flush loop drain the
    /// active buffer one last time, wait up to `timeout` for in-flight
    /// writes, then force-release the sink regardless. Exceeding the timeout
    /// logs a warning and may truncate the final batch; it never hangs the
    /// host and is never surfaced as an error. Idempotent, and safe to call
    /// concurrently with `add_entry`.
    pub async fn stop(&self, timeout: Duration) -> Result<(), PipelineError> {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_STOPPING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        let runtime = self.inner.runtime.lock().await.take();
        if let Some(runtime) = runtime {
            runtime.cancel.cancel();
            // Closing the channel lets the workers drain what is queued and
            // exit; the flush loop holds its own sender until its final
            // flush is done.
            drop(runtime.batch_tx);

            let deadline = Instant::now() + timeout;
            let mut timed_out = false;
            for mut task in runtime.tasks {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if tokio::time::timeout(remaining, &mut task).await.is_err() {
                    task.abort();
                    timed_out = true;
                }
            }
            if timed_out {
                warn!(
                    "Shutdown timeout ({:?}) exceeded; forcing sink release, final batch may be truncated",
                    timeout
                );
            }
        }

        self.inner.sink.close().await;
        self.inner.state.store(STATE_STOPPED, Ordering::Release);
        debug!("Batch log processor stopped");
        Ok(())
    }

    /// Admission decision on the hot path. O(1), never blocks on I/O, never
    /// returns an error. A `false` return tells the caller to use its
    /// fallback path.
    pub fn add_entry(&self, entry: LogEntry) -> bool {
        if self.inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            return false;
        }
        let config = self.current_config();

        if self.inner.memory.is_emergency(config.emergency_threshold) {
            if !self.inner.in_emergency.swap(true, Ordering::AcqRel) {
                self.inner.metrics.record_emergency_flush();
            }
            self.request_emergency_flush();
            return false;
        }
        self.inner.in_emergency.store(false, Ordering::Release);

        if self.inner.memory.is_pressure(config.pressure_threshold) {
            self.inner.metrics.record_pressure();
        }

        if config.enable_debug {
            trace!("Buffering entry from {}", entry.source());
        }

        let accepted = self.inner.buffer.add(entry);
        if !accepted {
            self.inner.metrics.record_overflow();
        }

        self.inner
            .metrics
            .update_peak(self.inner.buffer.active_count(), self.inner.memory.current_mb());

        if self.inner.buffer.active_count() >= config.batch_size {
            self.inner.flush_notify.notify_one();
        }
        accepted
    }

    /// Ask for an out-of-schedule flush. Multiple requests before the loop
    /// wakes collapse into a single flush.
    pub fn request_emergency_flush(&self) {
        self.inner.emergency_pending.store(true, Ordering::Release);
        self.inner.flush_notify.notify_one();
    }

    /// Wake the flush loop now, regardless of size or interval.
    pub fn force_flush(&self) {
        self.inner.flush_notify.notify_one();
    }

    /// Replace the configuration snapshot. The flush loop and admission path
    /// read the new thresholds at their next decision point; entries already
    /// buffered are never resized or migrated.
    pub fn configure(&self, new_config: BatchConfig) {
        self.inner.buffer.set_capacity(new_config.max_buffer_size);
        self.inner.memory.set_max_memory_mb(new_config.max_memory_mb);
        #[allow(clippy::expect_used)]
        let mut config = self.inner.config.write().expect("lock poisoned");
        *config = Arc::new(new_config);
    }

    pub fn health(&self) -> PipelineHealth {
        let config = self.current_config();
        PipelineHealth {
            active_entries: self.inner.buffer.active_count(),
            active_bytes: self.inner.buffer.active_bytes(),
            memory_pressure: self.inner.memory.is_pressure(config.pressure_threshold),
            emergency: self.inner.memory.is_emergency(config.emergency_threshold),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    async fn flush_loop(
        self,
        batch_tx: mpsc::Sender<Vec<LogEntry>>,
        cancel: CancellationToken,
    ) {
        debug!("Flush loop started");
        let mut last_flush = Instant::now();
        loop {
            let interval = self.current_config().flush_interval;
            let deadline = last_flush + interval;
            tokio::select! {
                _ = self.inner.flush_notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => {}
                _ = cancel.cancelled() => break,
            }
            self.flush_once(&batch_tx);
            last_flush = Instant::now();
        }

        // Final synchronous flush: whatever is still buffered goes straight
        // to the sink so a clean shutdown loses nothing.
        if let Some(batch) = self.inner.buffer.swap() {
            debug!("Final flush of {} entries", batch.len());
            self.write_batch(batch).await;
            self.inner.buffer.clear_drain();
        }
        debug!("Flush loop stopped");
    }

    /// One flush-loop iteration: swap the buffers and hand the drained
    /// sequence to the writer pool without awaiting the write.
    fn flush_once(&self, batch_tx: &mpsc::Sender<Vec<LogEntry>>) {
        let emergency = self.inner.emergency_pending.swap(false, Ordering::AcqRel);
        if let Some(batch) = self.inner.buffer.swap() {
            if emergency {
                debug!("Emergency flush of {} entries", batch.len());
            }
            match batch_tx.try_send(batch) {
                Ok(()) => {}
                Err(TrySendError::Full(batch)) => {
                    // Memory bounding wins over delivery: the writer queue
                    // is full, so this batch is dropped, not queued.
                    self.inner.metrics.record_failed_write();
                    warn!(
                        "Writer pool saturated; dropping batch of {} entries",
                        batch.len()
                    );
                }
                Err(TrySendError::Closed(batch)) => {
                    self.inner.metrics.record_failed_write();
                    error!(
                        "Writer pool gone; dropping batch of {} entries",
                        batch.len()
                    );
                }
            }
            self.inner.buffer.clear_drain();
        }
    }

    async fn writer_worker(
        &self,
        worker_id: usize,
        batch_rx: Arc<Mutex<mpsc::Receiver<Vec<LogEntry>>>>,
    ) {
        debug!("Writer worker {} started", worker_id);
        loop {
            let batch = batch_rx.lock().await.recv().await;
            match batch {
                Some(batch) => self.write_batch(batch).await,
                None => break,
            }
        }
        debug!("Writer worker {} stopped", worker_id);
    }

    async fn write_batch(&self, batch: Vec<LogEntry>) {
        let durable = matches!(self.current_config().durability, DurabilityMode::Sync);
        let started = Instant::now();
        match self.inner.sink.write_batch(&batch, durable).await {
            Ok(bytes) => {
                self.inner
                    .metrics
                    .record_batch(batch.len(), started.elapsed(), bytes);
            }
            Err(e) => {
                // Best-effort semantics: the batch is dropped, not retried.
                self.inner.metrics.record_failed_write();
                error!("Failed to write batch of {} entries: {}", batch.len(), e);
            }
        }
    }

    async fn metrics_report_loop(self, cancel: CancellationToken) {
        let mut last_report = Instant::now();
        loop {
            // Interval and enablement come from the live config so
            // `configure` takes effect at the next tick.
            let deadline = last_report + self.current_config().metrics_report_interval;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    last_report = Instant::now();
                    if !self.current_config().enable_metrics {
                        continue;
                    }
                    let snapshot = self.inner.metrics.snapshot();
                    match serde_json::to_string(&snapshot) {
                        Ok(json) => info!("Pipeline metrics: {}", json),
                        Err(e) => warn!("Failed to serialize metrics snapshot: {}", e),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}
