// SPDX-License-Identifier: MIT
//
// ATRNG Client: Entropy Contribution Library
// Copyright (c) 2025 ATRNG Client Contributors
//
// https://github.com/atdevs/atrng-client

//! Engine.IO v4 / Socket.IO v5 framing
//!
//! The collection service is a stock Socket.IO server. Only the subset needed
//! by a websocket-only client that emits binary events is implemented here:
//!
//! ```text
//! server  0{"sid":..,"pingInterval":..,"pingTimeout":..}   open
//! client  40                                               join "/"
//! server  40{"sid":..}                                     joined
//! server  2            client  3                           heartbeat
//! client  451-["message",{"_placeholder":true,"num":0}]    binary event header
//! client  <binary frame>                                   attachment #0
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Engine.IO protocol revision spoken by this client
pub const ENGINE_IO_VERSION: u8 = 4;

/// Path a Socket.IO server mounts on unless configured otherwise
pub const DEFAULT_PATH: &str = "/socket.io/";

/// Payload of the Engine.IO open packet
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl Handshake {
    /// Longest silence tolerated before the session is considered dead
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

/// Engine.IO packet as carried in a websocket text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Engine.IO frame".to_string()))?;
        let body = chars.as_str();

        match kind {
            '0' => Ok(Self::Open(serde_json::from_str(body)?)),
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping(body.to_string())),
            '3' => Ok(Self::Pong(body.to_string())),
            '4' => Ok(Self::Message(body.to_string())),
            '5' => Ok(Self::Upgrade),
            '6' => Ok(Self::Noop),
            other => Err(Error::Protocol(format!(
                "unknown Engine.IO packet type '{}'",
                other
            ))),
        }
    }
}

/// Socket.IO packet carried inside an Engine.IO message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPacket {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError(String),
    BinaryEvent,
    BinaryAck,
}

impl SocketPacket {
    pub fn decode(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::Protocol("empty Socket.IO packet".to_string()))?;

        match kind {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Ok(Self::Event),
            '3' => Ok(Self::Ack),
            '4' => Ok(Self::ConnectError(connect_error_message(chars.as_str()))),
            '5' => Ok(Self::BinaryEvent),
            '6' => Ok(Self::BinaryAck),
            other => Err(Error::Protocol(format!(
                "unknown Socket.IO packet type '{}'",
                other
            ))),
        }
    }
}

fn connect_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Answer to an Engine.IO ping
pub fn pong(probe: &str) -> String {
    format!("3{}", probe)
}

/// Join the default namespace
pub fn namespace_connect() -> String {
    "40".to_string()
}

/// Leave the default namespace
pub fn namespace_disconnect() -> String {
    "41".to_string()
}

/// Text frame announcing a binary event with a single attachment
pub fn binary_event_header(event: &str) -> Result<String> {
    let args = json!([event, { "_placeholder": true, "num": 0 }]);
    Ok(format!("451-{}", serde_json::to_string(&args)?))
}

/// Websocket endpoint for a Socket.IO server URL
///
/// `https`/`http` map to `wss`/`ws`; a bare host gets the default mount path.
pub fn endpoint_url(server: &Url) -> Result<Url> {
    let mut url = server.clone();

    let scheme = match server.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::Config(format!(
                "unsupported server URL scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("cannot use scheme '{}' for {}", scheme, server)))?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_PATH);
    }

    url.query_pairs_mut()
        .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
        .append_pair("transport", "websocket");

    Ok(url)
}
