// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::PipelineError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MAX_BUFFER_SIZE: usize = 10_000;
const DEFAULT_MAX_MEMORY_MB: u64 = 512;
const DEFAULT_WRITER_WORKERS: usize = 2;
const DEFAULT_METRICS_REPORT_INTERVAL_MS: u64 = 60_000;

/// Default fraction of the memory budget at which the pipeline reports
/// pressure and starts flushing more aggressively.
pub const DEFAULT_PRESSURE_THRESHOLD: f64 = 0.8;
/// Default fraction of the memory budget at which admission stops.
pub const DEFAULT_EMERGENCY_THRESHOLD: f64 = 0.95;

/// Whether batch writes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Writes reach the OS buffer cache only.
    Buffered,
    /// Every batch is followed by a data sync.
    Sync,
}

/// Configuration snapshot for the batching pipeline.
///
/// A snapshot is replaceable at runtime via
/// [`BatchLogProcessor::configure`](crate::processor::BatchLogProcessor::configure);
/// replacement takes effect at the processor's next decision point and is not
/// applied retroactively to entries already buffered. The processor trusts
/// any snapshot it is handed; cross-field constraints are enforced by the
/// admin boundary through [`BatchConfig::validate`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Entries per batch; reaching this count schedules a flush.
    pub batch_size: usize,
    /// Upper bound on how long an entry may sit in the active buffer.
    pub flush_interval: Duration,
    /// Hard cap on entries in the active buffer.
    pub max_buffer_size: usize,
    /// Process resident-memory budget in MiB.
    pub max_memory_mb: u64,
    /// Fraction of the memory budget that counts as pressure.
    pub pressure_threshold: f64,
    /// Fraction of the memory budget that stops admission.
    pub emergency_threshold: f64,
    /// Number of writer-pool workers.
    pub writer_workers: usize,
    /// Sync-per-batch vs. buffered writes.
    pub durability: DurabilityMode,
    /// Enable the periodic metrics-report loop.
    pub enable_metrics: bool,
    /// How often the metrics-report loop logs a snapshot.
    pub metrics_report_interval: Duration,
    /// Enable per-entry trace diagnostics.
    pub enable_debug: bool,
    /// Path of the append-only sink file.
    pub log_path: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            pressure_threshold: DEFAULT_PRESSURE_THRESHOLD,
            emergency_threshold: DEFAULT_EMERGENCY_THRESHOLD,
            writer_workers: DEFAULT_WRITER_WORKERS,
            durability: DurabilityMode::Buffered,
            enable_metrics: false,
            metrics_report_interval: Duration::from_millis(DEFAULT_METRICS_REPORT_INTERVAL_MS),
            enable_debug: false,
            log_path: PathBuf::from("archive.log"),
        }
    }
}

impl BatchConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        let defaults = Self::default();

        let batch_size = env::var("LOGBATCH_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.batch_size);
        let flush_interval = env::var("LOGBATCH_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.flush_interval);
        let max_buffer_size = env::var("LOGBATCH_MAX_BUFFER_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.max_buffer_size);
        let max_memory_mb = env::var("LOGBATCH_MAX_MEMORY_MB")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.max_memory_mb);
        let writer_workers = env::var("LOGBATCH_WRITER_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.writer_workers);
        let durability = match env::var("LOGBATCH_SYNC_WRITES") {
            Ok(v) if v.to_lowercase() != "false" => DurabilityMode::Sync,
            _ => DurabilityMode::Buffered,
        };
        let enable_metrics = env::var("LOGBATCH_ENABLE_METRICS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(defaults.enable_metrics);
        let metrics_report_interval = env::var("LOGBATCH_METRICS_REPORT_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.metrics_report_interval);
        let enable_debug = env::var("LOGBATCH_ENABLE_DEBUG")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(defaults.enable_debug);
        let log_path = env::var("LOGBATCH_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.log_path);

        let config = Self {
            batch_size,
            flush_interval,
            max_buffer_size,
            max_memory_mb,
            pressure_threshold: defaults.pressure_threshold,
            emergency_threshold: defaults.emergency_threshold,
            writer_workers,
            durability,
            enable_metrics,
            metrics_report_interval,
            enable_debug,
            log_path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration. This runs at the admin boundary; the
    /// processor itself never re-checks a snapshot.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.max_buffer_size < self.batch_size {
            return Err(PipelineError::Config(format!(
                "max_buffer_size ({}) must be at least batch_size ({})",
                self.max_buffer_size, self.batch_size
            )));
        }
        if self.max_memory_mb == 0 {
            return Err(PipelineError::Config(
                "max_memory_mb must be greater than 0".to_string(),
            ));
        }
        if self.writer_workers == 0 {
            return Err(PipelineError::Config(
                "writer_workers must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.pressure_threshold)
            || !(0.0..=1.0).contains(&self.emergency_threshold)
        {
            return Err(PipelineError::Config(
                "thresholds must be fractions in [0, 1]".to_string(),
            ));
        }
        if self.pressure_threshold > self.emergency_threshold {
            return Err(PipelineError::Config(format!(
                "pressure_threshold ({}) must not exceed emergency_threshold ({})",
                self.pressure_threshold, self.emergency_threshold
            )));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::Config(
                "flush_interval must be non-zero".to_string(),
            ));
        }
        if self.metrics_report_interval.is_zero() {
            return Err(PipelineError::Config(
                "metrics_report_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
