// SPDX-License-Identifier: MIT
//
// ATRNG Client: Entropy Contribution Library
// Copyright (c) 2025 ATRNG Client Contributors
//
// https://github.com/atdevs/atrng-client

//! ATRNG Core Library
//!
//! Client for the ATRNG entropy collection service. It contributes locally
//! generated randomness over a persistent Socket.IO session and retrieves
//! externally generated randomness over HTTPS.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `connection`: owned session handle with idempotent connect
//! - `keepalive`: periodic emission of fresh CSPRNG bytes
//! - `discard`: buffered low-value entropy condensed into one digest per interval
//! - `fetcher`: remote randomness condensed into hex or an integer
//! - `client`: start/stop orchestration over all of the above
//! - `socketio` / `protocol`: websocket transport and its framing
//! - `config`, `error`, `metrics`: ambient concerns
//!
//! Background loops never surface transport failures; they log them and try
//! again on their next tick. Direct calls (`fetch_hex`, `fetch_integer`,
//! untyped `discard_value` / `send_value`) return errors to the caller.

pub mod client;
pub mod config;
pub mod connection;
pub mod crypto;
pub mod discard;
pub mod error;
pub mod fetcher;
pub mod keepalive;
pub mod metrics;
pub mod payload;
pub mod protocol;
pub mod socketio;
mod task;
pub mod transport;

pub use client::AtrngClient;
pub use error::{Error, Result};
pub use payload::Payload;

/// Library version for protocol compatibility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Socket.IO endpoint of the public collection service
pub const DEFAULT_SERVER_URL: &str = "wss://rng-dump.atdevs.org";

/// HTTP endpoint serving raw random bytes
pub const DEFAULT_FETCH_URL: &str = "https://rng-api.atdevs.org/random";

/// Socket.IO event the service listens on
pub const DEFAULT_EVENT_NAME: &str = "message";

/// Bytes of fresh randomness per keepalive
pub const DEFAULT_KEEPALIVE_SIZE: usize = 128;

/// Largest keepalive payload accepted by configuration (64 KiB)
pub const MAX_PAYLOAD_SIZE: usize = 65_536;
