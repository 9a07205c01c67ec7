//! Discard buffer and flush loop
//!
//! High-frequency, low-value entropy is appended to an in-memory buffer and
//! condensed into a single digest per interval, which bounds the bandwidth
//! spent on it regardless of how much callers feed in.
//!
//! Appends and the drain-hash-clear sequence take the same lock, so a drain
//! always condenses a prefix of the append order and no byte is condensed
//! twice. The lock is released before the digest goes on the wire.

use crate::config::{FlushFailurePolicy, HashAlgorithm};
use crate::connection::ConnectionManager;
use crate::metrics::Metrics;
use crate::task::BackgroundTask;
use crate::transport::Transport;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Append-only byte accumulator
#[derive(Clone, Default)]
pub struct DiscardBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

/// Bytes removed from the buffer together with their digest
#[derive(Debug)]
pub struct DrainedBatch {
    pub digest: Bytes,
    pub bytes: Vec<u8>,
}

impl DiscardBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes; never blocks on I/O
    pub fn append(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.inner.lock().extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash the entire buffer and clear it in one critical section
    ///
    /// Returns `None` when there is nothing to condense.
    pub fn drain(&self, algorithm: HashAlgorithm) -> Option<DrainedBatch> {
        let mut buffer = self.inner.lock();
        if buffer.is_empty() {
            return None;
        }

        let digest = algorithm.digest(&buffer);
        let bytes = std::mem::take(&mut *buffer);
        Some(DrainedBatch { digest, bytes })
    }

    /// Put a drained batch back in front of anything appended since
    pub fn restore(&self, batch: Vec<u8>) {
        let mut buffer = self.inner.lock();
        let appended = std::mem::replace(&mut *buffer, batch);
        buffer.extend_from_slice(&appended);
    }

    #[cfg(test)]
    fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }
}

/// Result of one flush attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Digest of `bytes` buffered bytes was emitted
    Sent { bytes: usize },
    /// No session; buffer untouched
    Disconnected,
    /// Nothing buffered
    Empty,
    /// Emit failed; batch dropped or restored according to policy
    Failed { bytes: usize, retained: bool },
}

/// Discard flush loop controller
pub struct DiscardLoop<T> {
    worker: Arc<DiscardWorker<T>>,
    task: BackgroundTask,
}

struct DiscardWorker<T> {
    connection: Arc<ConnectionManager<T>>,
    buffer: DiscardBuffer,
    interval: Duration,
    algorithm: HashAlgorithm,
    policy: FlushFailurePolicy,
    metrics: Metrics,
}

impl<T: Transport> DiscardLoop<T> {
    pub fn new(
        connection: Arc<ConnectionManager<T>>,
        buffer: DiscardBuffer,
        interval: Duration,
        algorithm: HashAlgorithm,
        policy: FlushFailurePolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            worker: Arc::new(DiscardWorker {
                connection,
                buffer,
                interval,
                algorithm,
                policy,
                metrics,
            }),
            task: BackgroundTask::new("Discard loop"),
        }
    }

    /// Start the loop; returns false if it was already running
    pub fn start(&self) -> bool {
        let worker = Arc::clone(&self.worker);
        self.task.start(move |token| worker.run(token))
    }

    pub fn stop(&self) -> bool {
        self.task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub async fn join(&self) {
        self.task.join().await
    }

    /// Ensure the session and flush once, outside the timer
    pub async fn flush(&self) -> FlushOutcome {
        self.worker.connection.ensure_connected().await;
        self.worker.flush().await
    }

    pub fn buffer(&self) -> &DiscardBuffer {
        &self.worker.buffer
    }
}

impl<T: Transport> DiscardWorker<T> {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.interval) => {}
            }

            self.connection.ensure_connected().await;
            self.flush().await;
        }
        debug!("Discard loop exited");
    }

    async fn flush(&self) -> FlushOutcome {
        if !self.connection.is_connected() {
            return FlushOutcome::Disconnected;
        }

        let Some(batch) = self.buffer.drain(self.algorithm) else {
            return FlushOutcome::Empty;
        };
        let bytes = batch.bytes.len();
        let mut in_flight = InFlight {
            buffer: &self.buffer,
            bytes: Some(batch.bytes),
            policy: self.policy,
        };

        match self.connection.emit(batch.digest).await {
            Ok(()) => {
                in_flight.settle();
                self.metrics.record_flush(bytes);
                info!(
                    "Sent {} digest of {} discarded bytes",
                    algorithm_name(self.algorithm),
                    bytes
                );
                FlushOutcome::Sent { bytes }
            }
            Err(e) => {
                self.metrics.record_emit_failure();
                let pending = in_flight.settle();
                let retained = self.policy == FlushFailurePolicy::Retain;
                if retained {
                    self.buffer.restore(pending);
                    warn!(
                        "Discard emit failed, keeping {} bytes for next flush: {}",
                        bytes, e
                    );
                } else {
                    self.metrics.record_batch_dropped();
                    warn!("Discard emit failed, dropped {} bytes: {}", bytes, e);
                }
                FlushOutcome::Failed { bytes, retained }
            }
        }
    }
}

/// Drained bytes whose digest is not yet confirmed on the wire
///
/// If the flush is abandoned mid-emit (timeout or task abort) the bytes go
/// back into the buffer under [`FlushFailurePolicy::Retain`].
struct InFlight<'a> {
    buffer: &'a DiscardBuffer,
    bytes: Option<Vec<u8>>,
    policy: FlushFailurePolicy,
}

impl InFlight<'_> {
    /// Take the bytes back; the emit has produced a result
    fn settle(&mut self) -> Vec<u8> {
        self.bytes.take().unwrap_or_default()
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some(bytes) = self.bytes.take() else {
            return;
        };
        if self.policy == FlushFailurePolicy::Retain {
            warn!("Discard flush abandoned, keeping {} bytes", bytes.len());
            self.buffer.restore(bytes);
        }
    }
}

fn algorithm_name(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "SHA-256",
        HashAlgorithm::Sha384 => "SHA-384",
        HashAlgorithm::Sha512 => "SHA-512",
    }
}
