// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process, memory-bounded, asynchronous log-batching pipeline.
//!
//! Many concurrent producers hand discrete log events to a [`LogIngress`];
//! the [`BatchLogProcessor`] buffers them in a double buffer, flushes on
//! size, time, or memory pressure, and writes size-bounded batches to a
//! durable [`Sink`] through a bounded writer pool. Producers are never
//! blocked on disk I/O and admission degrades to a synchronous fallback
//! instead of unbounded buffering.
//!
//! Delivery is best-effort and at-most-once: a batch that fails to write is
//! counted and dropped, and a forced shutdown timeout may truncate the final
//! batch. Both are deliberate trade-offs in favor of never stalling or
//! exhausting the host process.
//!
//! ```no_run
//! use logbatch::{BatchConfig, BatchLogProcessor, LogIngress};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), logbatch::PipelineError> {
//! let config = BatchConfig::from_env()?;
//! let processor = BatchLogProcessor::new(config);
//! processor.start().await?;
//!
//! let ingress = LogIngress::new(processor.clone(), "api");
//! ingress.info("request served");
//!
//! processor.stop(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod entry;
pub mod errors;
pub mod ingress;
pub mod memory;
pub mod metrics;
pub mod processor;
pub mod sink;

pub use buffer::BatchBuffer;
pub use config::{BatchConfig, DurabilityMode};
pub use entry::{LogEntry, LogLevel};
pub use errors::PipelineError;
pub use ingress::{FallbackWriter, LogIngress, StderrFallback};
pub use memory::{MemoryMonitor, MemoryProbe, ProcStatusProbe};
pub use metrics::{BatchMetrics, MetricsSnapshot};
pub use processor::{BatchLogProcessor, PipelineHealth, ProcessorState};
pub use sink::{FileSink, Sink};
