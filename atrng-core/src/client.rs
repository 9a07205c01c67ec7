//! Client facade wiring the connection, both loops and the fetcher together
//!
//! ```no_run
//! # async fn demo() -> atrng_core::Result<()> {
//! use atrng_core::{client::AtrngClient, config::ClientConfig};
//!
//! let client = AtrngClient::new(ClientConfig::default())?;
//! client.start().await;
//! client.discard("mouse moved to 412,96");
//! let hex = client.fetch_hex().await?;
//! # let _ = hex;
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::discard::{DiscardBuffer, DiscardLoop, FlushOutcome};
use crate::fetcher::{FetcherConfig, RemoteFetcher};
use crate::keepalive::Keepalive;
use crate::metrics::Metrics;
use crate::payload::Payload;
use crate::socketio::SocketIoTransport;
use crate::transport::Transport;
use crate::Result;
use num_bigint::BigUint;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Entropy contribution client
pub struct AtrngClient<T: Transport = SocketIoTransport> {
    connection: Arc<ConnectionManager<T>>,
    keepalive: Keepalive<T>,
    discard: DiscardLoop<T>,
    fetcher: RemoteFetcher,
    metrics: Metrics,
}

impl AtrngClient<SocketIoTransport> {
    /// Client speaking Socket.IO to the configured server
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, SocketIoTransport::new())
    }
}

impl<T: Transport> AtrngClient<T> {
    /// Client over a caller-supplied transport
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new();

        let connection = Arc::new(ConnectionManager::new(
            transport,
            ConnectionConfig {
                server_url: config.server_url()?,
                event_name: config.event_name.clone(),
                connect_timeout: config.connect_timeout(),
                emit_timeout: config.emit_timeout(),
            },
            metrics.clone(),
        ));

        let keepalive = Keepalive::new(
            Arc::clone(&connection),
            config.keepalive_interval(),
            config.keepalive_payload_size,
            metrics.clone(),
        );

        let discard = DiscardLoop::new(
            Arc::clone(&connection),
            DiscardBuffer::new(),
            config.discard_interval(),
            config.hash_algorithm,
            config.flush_failure_policy,
            metrics.clone(),
        );

        let fetcher = RemoteFetcher::new(
            FetcherConfig {
                url: config.fetch_url()?,
                timeout: config.fetch_timeout(),
                algorithm: config.hash_algorithm,
            },
            metrics.clone(),
        )?;

        Ok(Self {
            connection,
            keepalive,
            discard,
            fetcher,
            metrics,
        })
    }

    /// Connect, then start the keepalive and discard loops
    ///
    /// Every step is idempotent, so calling this again is harmless.
    pub async fn start(&self) {
        self.connection.ensure_connected().await;
        self.start_keepalive();
        self.start_discard_loop();
    }

    pub fn start_keepalive(&self) -> bool {
        self.keepalive.start()
    }

    pub fn stop_keepalive(&self) -> bool {
        self.keepalive.stop()
    }

    pub fn start_discard_loop(&self) -> bool {
        self.discard.start()
    }

    pub fn stop_discard_loop(&self) -> bool {
        self.discard.stop()
    }

    /// Emit `data` once as-is; transport failures are logged, not returned
    pub async fn send_data(&self, data: impl Into<Payload>) {
        let payload = data.into();
        self.connection.ensure_connected().await;

        if !self.connection.is_connected() {
            return;
        }

        if let Err(e) = self.connection.emit(payload.into_bytes()).await {
            self.metrics.record_emit_failure();
            warn!("Data send failed: {}", e);
        }
    }

    /// Like [`send_data`](Self::send_data) for untyped input
    ///
    /// Fails with [`Error::InvalidInput`](crate::Error::InvalidInput) before any
    /// network activity unless `value` is text or a byte array.
    pub async fn send_value(&self, value: Value) -> Result<()> {
        let payload = Payload::try_from(value)?;
        self.send_data(payload).await;
        Ok(())
    }

    /// Buffer low-value entropy for the next discard flush
    pub fn discard(&self, data: impl Into<Payload>) {
        let payload = data.into();
        self.discard.buffer().append(payload.as_bytes());
    }

    /// Like [`discard`](Self::discard) for untyped input; rejected input leaves
    /// the buffer untouched
    pub fn discard_value(&self, value: Value) -> Result<()> {
        let payload = Payload::try_from(value)?;
        self.discard(payload);
        Ok(())
    }

    /// Flush the discard buffer now instead of waiting for the next tick
    pub async fn flush_discarded(&self) -> FlushOutcome {
        self.discard.flush().await
    }

    pub async fn fetch_hex(&self) -> Result<String> {
        self.fetcher.fetch_hex().await
    }

    pub async fn fetch_integer(&self) -> Result<BigUint> {
        self.fetcher.fetch_integer().await
    }

    /// Stop both loops, wait for them to exit and close the session
    pub async fn shutdown(&self) {
        self.keepalive.join().await;
        self.discard.join().await;
        self.connection.disconnect().await;
        info!("Client shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive.is_running()
    }

    pub fn discard_loop_running(&self) -> bool {
        self.discard.is_running()
    }

    /// Bytes waiting for the next discard flush
    pub fn buffered_len(&self) -> usize {
        self.discard.buffer().len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }
}
