//! Request/response correlation over the worker's byte streams.
//!
//! `WorkerChannel` writes request lines to the worker and runs a reader task
//! that dispatches reply lines to the caller waiting on the matching id.
//! Callers hold no lock while waiting, so several requests may be in flight;
//! the pipeline still sends one at a time.

use crate::error::{NarratorError, Result};
use crate::worker::protocol::{self, Inbound, Payload, Reply, Request, RequestId, SynthesisResponse};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Calls waiting for a reply, plus whether the reader can still deliver one.
#[derive(Default)]
struct PendingCalls {
    /// Set by the reader task when the worker's output ends. No call may be
    /// registered afterwards, otherwise it would wait forever.
    closed: bool,
    calls: HashMap<RequestId, oneshot::Sender<SynthesisResponse>>,
}

type PendingTable = Arc<Mutex<PendingCalls>>;

fn lock(pending: &PendingTable) -> MutexGuard<'_, PendingCalls> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Correlates requests and replies on one worker connection.
pub struct WorkerChannel {
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    pending: PendingTable,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl WorkerChannel {
    /// Wrap a worker's stdout (`reader`) and stdin (`writer`).
    ///
    /// Spawns the reader task, so this must be called inside a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingTable = Arc::default();
        let reader = tokio::spawn(read_replies(reader, Arc::clone(&pending)));
        Self {
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    /// Send `payload` and wait for the reply carrying the same id.
    ///
    /// # Errors
    /// - `WorkerExited` if the worker's output ended before the reply arrived
    /// - `WorkerWrite` if the request could not be written
    pub async fn call(&self, payload: Payload) -> Result<SynthesisResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(NarratorError::WorkerExited);
            }
            pending.calls.insert(id, tx);
        }

        let line = match (Request { id, payload }).to_line() {
            Ok(line) => line,
            Err(e) => {
                self.forget(id);
                return Err(e);
            }
        };

        if let Err(e) = self.write_line(&line).await {
            self.forget(id);
            return Err(e);
        }
        tracing::trace!(id, "Request sent to worker");

        rx.await.map_err(|_| NarratorError::WorkerExited)
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| NarratorError::WorkerWrite {
            message: "worker input is closed".to_string(),
        })?;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| NarratorError::WorkerWrite {
                message: format!("Failed to write request: {}", e),
            })?;

        writer.flush().await.map_err(|e| NarratorError::WorkerWrite {
            message: format!("Failed to flush request: {}", e),
        })
    }

    fn forget(&self, id: RequestId) {
        lock(&self.pending).calls.remove(&id);
    }

    /// Number of requests waiting for a reply.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    /// True once the worker's output has ended; no further replies can arrive.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Close the worker's input stream, signalling end of requests.
    pub async fn close_input(&self) {
        if let Some(mut writer) = self.writer.lock().await.take()
            && let Err(e) = writer.shutdown().await
        {
            tracing::debug!("Closing worker input failed: {e}");
        }
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_replies<R>(reader: R, pending: PendingTable)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch(&line, &pending),
            Ok(None) => {
                tracing::debug!("Worker closed its output stream");
                break;
            }
            Err(e) => {
                tracing::warn!("Failed reading worker output: {e}");
                break;
            }
        }
    }

    let mut table = lock(&pending);
    table.closed = true;
    if !table.calls.is_empty() {
        tracing::warn!(
            orphaned = table.calls.len(),
            "Worker output ended with requests in flight"
        );
    }
    // Dropping the senders wakes every waiting caller with WorkerExited.
    table.calls.clear();
}

fn dispatch(line: &str, pending: &PendingTable) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match protocol::parse_line(line) {
        Ok(Inbound::Reply(Reply { id, result })) => {
            let waiter = lock(pending).calls.remove(&id);
            match waiter {
                Some(tx) => {
                    if tx.send(result).is_err() {
                        tracing::debug!(id, "Caller stopped waiting for reply");
                    }
                }
                None => tracing::warn!(id, "Dropping reply for unknown request"),
            }
        }
        Ok(Inbound::Diagnostic) => tracing::debug!(target: "narrator::worker", "{line}"),
        Err(e) => tracing::warn!("{e}"),
    }
}
