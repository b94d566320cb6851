// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Durable sinks.
//!
//! The pipeline writes batches through the [`Sink`] trait; the default
//! implementation appends newline-delimited JSON records to a local file.
//! The file handle is created lazily on the first write, kept open across
//! flushes, and released only on shutdown.

use crate::entry::LogEntry;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// Destination for drained batches.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Append every entry's serialized line plus a record terminator.
    /// Returns the number of bytes written. When `durable` is set the write
    /// is forced to stable storage before returning.
    async fn write_batch(&self, entries: &[LogEntry], durable: bool) -> io::Result<u64>;

    /// Flush and release the underlying resource. Idempotent.
    async fn close(&self);
}

/// Append-only file sink, one UTF-8 JSON record per line.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        debug!("Opening log sink at {}", self.path.display());
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn write_batch(&self, entries: &[LogEntry], durable: bool) -> io::Result<u64> {
        let started = Instant::now();
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }

        #[allow(clippy::expect_used)]
        let file = guard.as_mut().expect("handle opened above");

        let mut payload = Vec::with_capacity(
            entries
                .iter()
                .map(|e| e.serialized_size() + 1)
                .sum::<usize>(),
        );
        for entry in entries {
            payload.extend_from_slice(entry.serialized_line().as_bytes());
            payload.push(b'\n');
        }

        file.write_all(&payload).await?;
        file.flush().await?;
        if durable {
            file.sync_data().await?;
        }

        debug!(
            "Wrote {} entries ({} bytes) in {:?}",
            entries.len(),
            payload.len(),
            started.elapsed()
        );
        Ok(payload.len() as u64)
    }

    async fn close(&self) {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            // Errors at close time have nowhere useful to go.
            let _ = file.flush().await;
            let _ = file.sync_data().await;
            debug!("Closed log sink at {}", self.path.display());
        }
    }
}
