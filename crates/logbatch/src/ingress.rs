// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The entry point producers call.
//!
//! A [`LogIngress`] turns a raw log call into a [`LogEntry`] and forwards it
//! to the processor. When the processor is saturated or not running, the
//! entry is emitted synchronously through an always-available fallback so no
//! event is silently discarded. Nothing on this path can return an error to
//! the caller: logging infrastructure must never break business code.

use crate::entry::{LogEntry, LogLevel};
use crate::processor::BatchLogProcessor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::trace;

/// Always-available synchronous emitter used when the batched path refuses
/// an entry.
pub trait FallbackWriter: Send + Sync {
    fn emit(&self, line: &str) -> io::Result<()>;
}

/// Default fallback: direct unbuffered write to stderr.
#[derive(Debug, Default)]
pub struct StderrFallback;

impl FallbackWriter for StderrFallback {
    fn emit(&self, line: &str) -> io::Result<()> {
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        handle.write_all(line.as_bytes())?;
        handle.write_all(b"\n")
    }
}

/// Per-source adapter in front of the processor. Cheap to clone; the host
/// creates one per producer subsystem, all sharing the same processor.
#[derive(Clone)]
pub struct LogIngress {
    processor: BatchLogProcessor,
    source: String,
    fallback: Arc<dyn FallbackWriter>,
}

impl LogIngress {
    pub fn new(processor: BatchLogProcessor, source: impl Into<String>) -> Self {
        Self::with_fallback(processor, source, Arc::new(StderrFallback))
    }

    pub fn with_fallback(
        processor: BatchLogProcessor,
        source: impl Into<String>,
        fallback: Arc<dyn FallbackWriter>,
    ) -> Self {
        Self {
            processor,
            source: source.into(),
            fallback,
        }
    }

    /// Record one event. Returns `true` if the batched path accepted it,
    /// `false` if it went through the fallback. Never errors, never blocks
    /// on I/O beyond the fallback's own synchronous write.
    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        extra: BTreeMap<String, Value>,
    ) -> bool {
        let entry = LogEntry::new(level, self.source.clone(), message, extra);
        // Keep the rendered line around; the entry itself moves into the
        // buffer on acceptance.
        let line = entry.serialized_line().to_owned();
        if self.processor.add_entry(entry) {
            return true;
        }
        // Fallback errors are swallowed: there is nowhere further to degrade.
        if let Err(e) = self.fallback.emit(&line) {
            trace!("Fallback emit failed: {}", e);
        }
        false
    }

    pub fn trace(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Trace, message, BTreeMap::new())
    }

    pub fn debug(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Debug, message, BTreeMap::new())
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Info, message, BTreeMap::new())
    }

    pub fn warn(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Warn, message, BTreeMap::new())
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Error, message, BTreeMap::new())
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
