//! HTTPS client for fetching externally generated random bytes
//!
//! The response body is condensed with the configured one-way hash. Unlike the
//! background loops, failures here are returned to the caller.

use crate::config::HashAlgorithm;
use crate::crypto::{digest_to_hex, digest_to_integer};
use crate::metrics::Metrics;
use crate::{Error, Result};
use bytes::Bytes;
use num_bigint::BigUint;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Configuration for the remote fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Endpoint returning raw random bytes
    pub url: Url,
    /// Request timeout
    pub timeout: Duration,
    pub algorithm: HashAlgorithm,
}

impl FetcherConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            algorithm: HashAlgorithm::default(),
        }
    }
}

/// HTTP client for the remote randomness endpoint
pub struct RemoteFetcher {
    client: Client,
    config: FetcherConfig,
    metrics: Metrics,
}

impl RemoteFetcher {
    pub fn new(config: FetcherConfig, metrics: Metrics) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            config,
            metrics,
        })
    }

    /// Fetch the raw response body once, without retry
    #[instrument(skip(self), fields(url = %self.config.url))]
    pub async fn fetch_raw(&self) -> Result<Bytes> {
        let result = self.fetch_once().await;
        match &result {
            Ok(_) => self.metrics.record_fetch(),
            Err(_) => self.metrics.record_fetch_failure(),
        }
        result
    }

    async fn fetch_once(&self) -> Result<Bytes> {
        let url = &self.config.url;
        debug!("Fetching random bytes from {}", url);

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!("Failed to fetch from {}: {}", url, e);
            Error::Network(e)
        })?;

        // Check HTTP status
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP error {}: {}", status, body);
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data = response.bytes().await.map_err(Error::Network)?;
        debug!("Fetched {} bytes", data.len());
        Ok(data)
    }

    /// Digest of a freshly fetched body
    pub async fn fetch_digest(&self) -> Result<Bytes> {
        let body = self.fetch_raw().await?;
        Ok(self.config.algorithm.digest(&body))
    }

    /// Digest of a freshly fetched body as lowercase hex
    pub async fn fetch_hex(&self) -> Result<String> {
        Ok(digest_to_hex(&self.fetch_digest().await?))
    }

    /// Digest of a freshly fetched body as a big-endian unsigned integer
    pub async fn fetch_integer(&self) -> Result<BigUint> {
        Ok(digest_to_integer(&self.fetch_digest().await?))
    }
}
