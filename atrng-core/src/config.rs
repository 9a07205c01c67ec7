//! Configuration management for the ATRNG client

use crate::{Error, Result};
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::IntoDeserializer;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// One-way hash used to condense buffered and fetched entropy
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    /// 512-bit digest, the width the collection service expects
    Sha512,
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha512
    }
}

/// Accepts the same names as the `ATRNG_HASH_ALGORITHM` variable, in any case
impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.to_ascii_lowercase();
        let de: StrDeserializer<'_, ValueError> = name.as_str().into_deserializer();
        Self::deserialize(de).map_err(|e| Error::Config(format!("hash algorithm: {}", e)))
    }
}

/// What the discard loop does with a batch whose digest could not be emitted
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlushFailurePolicy {
    /// Lose the batch; the buffer never grows because of a failing peer
    Drop,
    /// Put the drained bytes back in front of anything appended since
    Retain,
}

impl Default for FlushFailurePolicy {
    fn default() -> Self {
        Self::Drop
    }
}

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Socket.IO endpoint of the entropy collection service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// HTTP endpoint returning raw random bytes
    #[serde(default = "default_fetch_url")]
    pub fetch_url: String,

    /// Socket.IO event carrying entropy payloads
    #[serde(default = "default_event_name")]
    pub event_name: String,

    /// Keepalive interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Bytes of fresh randomness sent per keepalive
    #[serde(default = "default_payload_size")]
    pub keepalive_payload_size: usize,

    /// Discard flush interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub discard_interval_ms: u64,

    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,

    #[serde(default)]
    pub flush_failure_policy: FlushFailurePolicy,

    /// Upper bound on a single connect attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound on a single emit
    #[serde(default = "default_emit_timeout_ms")]
    pub emit_timeout_ms: u64,

    /// Upper bound on a remote fetch request
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            fetch_url: default_fetch_url(),
            event_name: default_event_name(),
            keepalive_interval_ms: default_interval_ms(),
            keepalive_payload_size: default_payload_size(),
            discard_interval_ms: default_interval_ms(),
            hash_algorithm: HashAlgorithm::default(),
            flush_failure_policy: FlushFailurePolicy::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            emit_timeout_ms: default_emit_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from `ATRNG_`-prefixed environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of `ATRNG_`-prefixed variables
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::prefixed("ATRNG_")
            .from_iter(vars)
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let server = self.server_url()?;
        if !matches!(server.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(Error::Config(format!(
                "server_url must use ws, wss, http or https, got '{}'",
                server.scheme()
            )));
        }

        let fetch = self.fetch_url()?;
        if !matches!(fetch.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "fetch_url must use http or https, got '{}'",
                fetch.scheme()
            )));
        }

        if self.event_name.is_empty() {
            return Err(Error::Config("event_name cannot be empty".to_string()));
        }

        if self.keepalive_interval_ms == 0 || self.discard_interval_ms == 0 {
            return Err(Error::Config("intervals must be > 0".to_string()));
        }

        if !(1..=crate::MAX_PAYLOAD_SIZE).contains(&self.keepalive_payload_size) {
            return Err(Error::Config(format!(
                "keepalive_payload_size must be between 1 and {}",
                crate::MAX_PAYLOAD_SIZE
            )));
        }

        if self.connect_timeout_ms == 0 || self.emit_timeout_ms == 0 || self.fetch_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be > 0".to_string()));
        }

        Ok(())
    }

    pub fn server_url(&self) -> Result<Url> {
        Url::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("Invalid server_url '{}': {}", self.server_url, e)))
    }

    pub fn fetch_url(&self) -> Result<Url> {
        Url::parse(&self.fetch_url)
            .map_err(|e| Error::Config(format!("Invalid fetch_url '{}': {}", self.fetch_url, e)))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn discard_interval(&self) -> Duration {
        Duration::from_millis(self.discard_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn emit_timeout(&self) -> Duration {
        Duration::from_millis(self.emit_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

// Default value functions
fn default_server_url() -> String {
    crate::DEFAULT_SERVER_URL.to_string()
}

fn default_fetch_url() -> String {
    crate::DEFAULT_FETCH_URL.to_string()
}

fn default_event_name() -> String {
    crate::DEFAULT_EVENT_NAME.to_string()
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_payload_size() -> usize {
    crate::DEFAULT_KEEPALIVE_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_emit_timeout_ms() -> u64 {
    5_000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}
