//! Keepalive loop: proves liveness and contributes fresh CSPRNG bytes
//!
//! Every interval the loop makes sure the session is up and emits a fixed-size
//! block of random bytes. A failed emit is logged and forgotten; the payload is
//! disposable and the next tick sends a new one.

use crate::connection::ConnectionManager;
use crate::crypto::random_block;
use crate::metrics::Metrics;
use crate::task::BackgroundTask;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Keepalive loop controller
pub struct Keepalive<T> {
    worker: Arc<KeepaliveWorker<T>>,
    task: BackgroundTask,
}

struct KeepaliveWorker<T> {
    connection: Arc<ConnectionManager<T>>,
    interval: Duration,
    payload_size: usize,
    metrics: Metrics,
}

impl<T: Transport> Keepalive<T> {
    pub fn new(
        connection: Arc<ConnectionManager<T>>,
        interval: Duration,
        payload_size: usize,
        metrics: Metrics,
    ) -> Self {
        Self {
            worker: Arc::new(KeepaliveWorker {
                connection,
                interval,
                payload_size,
                metrics,
            }),
            task: BackgroundTask::new("Keepalive"),
        }
    }

    /// Start the loop; returns false if it was already running
    pub fn start(&self) -> bool {
        let worker = Arc::clone(&self.worker);
        self.task.start(move |token| worker.run(token))
    }

    /// Ask the loop to exit; takes effect at the next iteration boundary
    pub fn stop(&self) -> bool {
        self.task.stop()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Stop and wait for the loop to exit
    pub async fn join(&self) {
        self.task.join().await
    }

    /// Run one keepalive iteration; returns whether a block was sent
    pub async fn tick(&self) -> bool {
        self.worker.tick().await
    }
}

impl<T: Transport> KeepaliveWorker<T> {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        while !token.is_cancelled() {
            self.tick().await;

            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
        }
        debug!("Keepalive loop exited");
    }

    async fn tick(&self) -> bool {
        if !self.connection.is_connected() {
            self.connection.ensure_connected().await;
        }

        if !self.connection.is_connected() {
            return false;
        }

        let block = random_block(self.payload_size);
        match self.connection.emit(block).await {
            Ok(()) => {
                self.metrics.record_keepalive(self.payload_size);
                debug!("Keepalive sent {} bytes of random data", self.payload_size);
                true
            }
            Err(e) => {
                self.metrics.record_emit_failure();
                warn!("Keepalive emit failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::test_config;
    use crate::transport::fake::FakeTransport;

    type Fixture = (
        Keepalive<FakeTransport>,
        Arc<ConnectionManager<FakeTransport>>,
        Metrics,
    );

    fn keepalive(transport: FakeTransport) -> Fixture {
        let metrics = Metrics::new();
        let connection = Arc::new(ConnectionManager::new(
            transport,
            test_config(),
            metrics.clone(),
        ));
        let keepalive = Keepalive::new(
            Arc::clone(&connection),
            Duration::from_secs(10),
            128,
            metrics.clone(),
        );
        (keepalive, connection, metrics)
    }

    #[tokio::test]
    async fn test_tick_sends_fresh_block() {
        let (keepalive, connection, metrics) = keepalive(FakeTransport::new());

        assert!(keepalive.tick().await);
        assert!(keepalive.tick().await);

        let emitted = connection.transport().emitted();
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|(event, payload)| event == "message" && payload.len() == 128));
        assert_ne!(emitted[0].1, emitted[1].1);
        assert_eq!(metrics.snapshot().keepalives_sent, 2);
    }

    #[tokio::test]
    async fn test_tick_while_unreachable_sends_nothing() {
        let (keepalive, connection, _) = keepalive(FakeTransport::unreachable());

        assert!(!keepalive.tick().await);
        assert_eq!(connection.transport().connect_calls(), 1);
        assert_eq!(connection.transport().emit_count(), 0);
    }

    #[tokio::test]
    async fn test_emit_failure_is_not_fatal() {
        let (keepalive, connection, metrics) = keepalive(FakeTransport::new());
        connection.transport().set_fail_emit(true);
        assert!(!keepalive.tick().await);

        connection.transport().set_fail_emit(false);
        assert!(keepalive.tick().await);
        assert_eq!(metrics.snapshot().emits_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_every_interval() {
        let (keepalive, connection, _) = keepalive(FakeTransport::new());

        assert!(keepalive.start());
        assert!(!keepalive.start());
        sleep(Duration::from_secs(25)).await;

        // ticks at 0s, 10s and 20s from a single task
        assert_eq!(connection.transport().emit_count(), 3);
        assert!(keepalive.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_transmissions() {
        let (keepalive, connection, _) = keepalive(FakeTransport::new());

        keepalive.start();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(connection.transport().emit_count(), 1);

        assert!(keepalive.stop());
        sleep(Duration::from_secs(30)).await;
        assert_eq!(connection.transport().emit_count(), 1);
        assert!(!keepalive.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_on_later_tick() {
        let (keepalive, connection, _) = keepalive(FakeTransport::unreachable());

        keepalive.start();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(connection.transport().emit_count(), 0);

        connection.transport().set_reachable(true);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(connection.transport().emit_count(), 1);
        keepalive.join().await;
    }
}
