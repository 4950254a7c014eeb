//! Write-side helpers for the synchronization layer.
//!
//! Sync clients usually receive entries as serialized batches on some
//! network task. [`decode_batch`] turns a JSON payload into records, and
//! [`SyncIngest`] funnels batches from any number of producers into one
//! store through a tokio task.

use crate::error::PermviewError;
use crate::record::Record;
use crate::version_store::SharedStore;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Decodes a JSON array of records.
pub fn decode_batch<T: Record + DeserializeOwned>(payload: &[u8]) -> Result<Vec<T>, PermviewError> {
    Ok(serde_json::from_slice(payload)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub batches: u64,
    pub entries: u64,
    pub rejected: u64,
    pub last_version: Option<u64>,
}

/// Background task committing batches in arrival order.
///
/// A batch the store refuses is logged and counted; later batches still go
/// through. The task ends once every sender is dropped.
pub struct SyncIngest<T: Record> {
    sender: mpsc::Sender<Vec<T>>,
    handle: JoinHandle<IngestSummary>,
}

impl<T: Record> SyncIngest<T> {
    /// Spawns the ingest task on the current tokio runtime.
    pub fn spawn(store: SharedStore<T>, capacity: usize) -> Result<Self, PermviewError> {
        if store.is_read_only() {
            return Err(PermviewError::UnsupportedOperation {
                operation: "ingest into a read-only store handle",
            });
        }
        let (sender, mut rx) = mpsc::channel::<Vec<T>>(capacity.max(1));
        let handle = tokio::spawn(async move {
            let mut summary = IngestSummary::default();
            while let Some(batch) = rx.recv().await {
                summary.batches += 1;
                let len = batch.len() as u64;
                match store.commit(batch) {
                    Ok(version) => {
                        summary.entries += len;
                        summary.last_version = Some(version);
                    }
                    Err(err) => {
                        summary.rejected += 1;
                        warn!(store = store.id(), entries = len, error = %err, "sync batch rejected");
                    }
                }
            }
            debug!(
                store = store.id(),
                batches = summary.batches,
                rejected = summary.rejected,
                "sync ingest drained"
            );
            summary
        });
        Ok(Self { sender, handle })
    }

    pub async fn send(&self, batch: Vec<T>) -> Result<(), PermviewError> {
        self.sender.send(batch).await.map_err(|_| PermviewError::Detached)
    }

    /// Blocking variant for producers on plain threads. Panics if called
    /// from inside an async context, like [`mpsc::Sender::blocking_send`].
    pub fn send_blocking(&self, batch: Vec<T>) -> Result<(), PermviewError> {
        self.sender.blocking_send(batch).map_err(|_| PermviewError::Detached)
    }

    /// Extra producer handle; ingest continues until all of them are gone.
    pub fn sender(&self) -> mpsc::Sender<Vec<T>> {
        self.sender.clone()
    }

    /// Closes this producer and waits for queued batches to be committed.
    pub async fn finish(self) -> Result<IngestSummary, PermviewError> {
        let Self { sender, handle } = self;
        drop(sender);
        handle
            .await
            .map_err(|err| PermviewError::Validation(format!("sync ingest task failed: {err}")))
    }
}
