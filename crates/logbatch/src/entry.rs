// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Structured log entries.
//!
//! A [`LogEntry`] is the unit the pipeline buffers, batches, and writes. The
//! newline-delimited JSON representation is rendered exactly once, in the
//! constructor, so neither the hot path nor the writer pool ever touches the
//! serializer again. The entry is immutable after construction.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One immutable structured log event with its precomputed serialized line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    source: String,
    message: String,
    extra: BTreeMap<String, Value>,
    serialized: String,
}

impl LogEntry {
    /// Build an entry stamped with the current time.
    pub fn new(
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
        extra: BTreeMap<String, Value>,
    ) -> Self {
        Self::with_timestamp(Utc::now(), level, source, message, extra)
    }

    /// Build an entry with an explicit timestamp.
    pub fn with_timestamp(
        timestamp: DateTime<Utc>,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
        extra: BTreeMap<String, Value>,
    ) -> Self {
        let source = source.into();
        let message = message.into();
        let serialized = serialize_line(&timestamp, level, &source, &message, &extra);
        Self {
            timestamp,
            level,
            source,
            message,
            extra,
            serialized,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Source name; also the reserved partition key for multi-sink routing.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// The JSON line rendered at construction, without a trailing newline.
    pub fn serialized_line(&self) -> &str {
        &self.serialized
    }

    /// Byte length of the serialized line.
    pub fn serialized_size(&self) -> usize {
        self.serialized.len()
    }
}

fn serialize_line(
    timestamp: &DateTime<Utc>,
    level: LogLevel,
    source: &str,
    message: &str,
    extra: &BTreeMap<String, Value>,
) -> String {
    let mut record = Map::new();
    record.insert(
        "timestamp".to_string(),
        Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    record.insert("level".to_string(), Value::String(level.to_string()));
    record.insert("source".to_string(), Value::String(source.to_string()));
    record.insert("message".to_string(), Value::String(message.to_string()));
    for (key, value) in extra {
        // Core fields win on name collisions
        record.entry(key.clone()).or_insert_with(|| value.clone());
    }

    #[allow(clippy::expect_used)]
    serde_json::to_string(&Value::Object(record)).expect("JSON maps with string keys serialize")
}
