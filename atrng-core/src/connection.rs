//! Connection manager owning the single persistent session
//!
//! Connection failures are reported and swallowed here. Callers retry simply
//! by calling [`ConnectionManager::ensure_connected`] again on their next tick.

use crate::metrics::Metrics;
use crate::transport::Transport;
use crate::{Error, Result};
use bytes::Bytes;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

/// Connection settings shared by every user of the session
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server_url: Url,
    /// Event name entropy payloads are emitted under
    pub event_name: String,
    pub connect_timeout: Duration,
    pub emit_timeout: Duration,
}

/// Owned handle to the persistent session
pub struct ConnectionManager<T> {
    transport: T,
    config: ConnectionConfig,
    metrics: Metrics,
    // Serialises connect attempts from concurrent loops
    connect_lock: tokio::sync::Mutex<()>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, config: ConnectionConfig, metrics: Metrics) -> Self {
        Self {
            transport,
            config,
            metrics,
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Connect unless already connected
    ///
    /// Tries exactly once per call and never raises; returns whether the
    /// session is usable afterwards.
    pub async fn ensure_connected(&self) -> bool {
        if self.transport.is_connected() {
            return true;
        }

        let _guard = self.connect_lock.lock().await;
        if self.transport.is_connected() {
            return true;
        }

        self.metrics.record_connect();
        let url = &self.config.server_url;
        let attempt = timeout(self.config.connect_timeout, self.transport.connect(url)).await;

        match attempt.map_err(Error::from).and_then(|result| result) {
            Ok(()) => {
                info!("Connected to {}", url);
                true
            }
            Err(e) => {
                self.metrics.record_connect_failure();
                warn!("Connection to {} failed: {}", url, e);
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Emit an opaque payload under the configured event name
    pub async fn emit(&self, payload: Bytes) -> Result<()> {
        let len = payload.len();
        timeout(
            self.config.emit_timeout,
            self.transport.emit(&self.config.event_name, payload),
        )
        .await??;

        debug!("Emitted {} bytes on '{}'", len, self.config.event_name);
        Ok(())
    }

    /// Close the session; failures are logged
    pub async fn disconnect(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
