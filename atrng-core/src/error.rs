// SPDX-License-Identifier: MIT
//
// ATRNG Client: Entropy Contribution Library
// Copyright (c) 2025 ATRNG Client Contributors
//
// https://github.com/atdevs/atrng-client

//! Error types for the ATRNG client
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ATRNG operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller passed data that is neither text nor bytes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP communication failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// WebSocket layer failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Peer sent a frame we could not make sense of
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Emit attempted without a live session
    #[error("Not connected")]
    NotConnected,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

}

impl Error {
    /// Errors raised by the persistent connection or the fetch transport.
    ///
    /// Background loops swallow these and try again on their next tick.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::WebSocket(_)
                | Error::Protocol(_)
                | Error::NotConnected
                | Error::Timeout
        )
    }

    /// Check if error was caused by the caller's input
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
