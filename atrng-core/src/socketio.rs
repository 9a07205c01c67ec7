//! Socket.IO client transport over `tokio-tungstenite`
//!
//! Opens a websocket-only Engine.IO session, joins the default namespace and
//! keeps the session alive by answering server pings from a background reader
//! task. The reader flips the connected flag off as soon as the server closes
//! the session, the socket errors, or the heartbeat deadline passes.

use crate::protocol::{self, EnginePacket, Handshake, SocketPacket};
use crate::transport::Transport;
use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Websocket-only Socket.IO session
pub struct SocketIoTransport {
    shared: Arc<Shared>,
}

struct Shared {
    connected: AtomicBool,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    /// Write frames back to back while holding the sink
    ///
    /// The frames of one event either all reach the socket or the session is
    /// torn down, including when this future is dropped part way through.
    async fn send(&self, frames: Vec<Message>) -> Result<()> {
        let guard = self.sink.lock().await;
        if guard.is_none() {
            return Err(Error::NotConnected);
        }

        let mut write = FrameWrite {
            shared: self,
            sink: guard,
            finished: false,
        };
        for frame in frames {
            let sink = write.sink.as_mut().ok_or(Error::NotConnected)?;
            sink.send(frame).await?;
        }

        write.finished = true;
        Ok(())
    }

    /// Forget the current session so the next connect starts clean
    fn invalidate(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

/// Sink access for one multi-frame write
struct FrameWrite<'a> {
    shared: &'a Shared,
    sink: tokio::sync::MutexGuard<'a, Option<WsSink>>,
    finished: bool,
}

impl Drop for FrameWrite<'_> {
    fn drop(&mut self) {
        if !self.finished {
            // the peer may hold a header without its attachment
            self.sink.take();
            self.shared.invalidate();
            warn!("Event write interrupted, session discarded");
        }
    }
}

impl SocketIoTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                connected: AtomicBool::new(false),
                sink: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
            }),
        }
    }
}

impl Default for SocketIoTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SocketIoTransport {
    async fn connect(&self, url: &Url) -> Result<()> {
        let endpoint = protocol::endpoint_url(url)?;
        debug!("Opening websocket to {}", endpoint);

        let (ws, _response) = connect_async(endpoint.as_str()).await?;
        let (mut sink, mut source) = ws.split();
        let handshake = open_session(&mut sink, &mut source).await?;

        let previous = self.shared.reader.lock().take();
        if let Some(reader) = previous {
            reader.abort();
        }

        *self.shared.sink.lock().await = Some(sink);
        self.shared.connected.store(true, Ordering::SeqCst);

        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            source,
            handshake.heartbeat_deadline(),
        ));
        *self.shared.reader.lock() = Some(reader);

        info!(sid = %handshake.sid, "Socket.IO session established");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn emit(&self, event: &str, payload: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let header = protocol::binary_event_header(event)?;
        self.shared
            .send(vec![Message::Text(header), Message::Binary(payload.to_vec())])
            .await
    }

    async fn disconnect(&self) -> Result<()> {
        let reader = self.shared.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        self.shared.connected.store(false, Ordering::SeqCst);

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            sink.send(Message::Text(protocol::namespace_disconnect())).await?;
            sink.close().await?;
            info!("Socket.IO session closed");
        }

        Ok(())
    }
}

/// Engine.IO open handshake followed by the namespace join
async fn open_session(sink: &mut WsSink, source: &mut WsSource) -> Result<Handshake> {
    let handshake = match next_packet(source).await? {
        EnginePacket::Open(handshake) => handshake,
        other => {
            return Err(Error::Protocol(format!(
                "expected open packet, got {:?}",
                other
            )))
        }
    };

    sink.send(Message::Text(protocol::namespace_connect())).await?;

    loop {
        match next_packet(source).await? {
            EnginePacket::Ping(probe) => sink.send(Message::Text(protocol::pong(&probe))).await?,
            EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
                SocketPacket::Connect => return Ok(handshake),
                SocketPacket::ConnectError(message) => {
                    return Err(Error::Protocol(format!(
                        "namespace connect refused: {}",
                        message
                    )))
                }
                _ => continue,
            },
            EnginePacket::Close => {
                return Err(Error::Protocol(
                    "server closed the session during handshake".to_string(),
                ))
            }
            _ => continue,
        }
    }
}

/// Next Engine.IO packet, skipping non-text frames
async fn next_packet(source: &mut WsSource) -> Result<EnginePacket> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return EnginePacket::decode(&text),
            Some(Ok(Message::Close(_))) | None => return Err(Error::NotConnected),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut source: WsSource, deadline: Duration) {
    loop {
        let packet = match tokio::time::timeout(deadline, next_packet(&mut source)).await {
            Ok(Ok(packet)) => packet,
            Ok(Err(Error::Protocol(reason))) => {
                debug!("Ignoring frame: {}", reason);
                continue;
            }
            Ok(Err(e)) => {
                warn!("Socket.IO session lost: {}", e);
                break;
            }
            Err(_) => {
                warn!("No heartbeat from server within {:?}", deadline);
                break;
            }
        };

        match packet {
            EnginePacket::Ping(probe) => {
                if let Err(e) = shared.send(vec![Message::Text(protocol::pong(&probe))]).await {
                    warn!("Failed to answer heartbeat: {}", e);
                    break;
                }
            }
            EnginePacket::Close => {
                info!("Server closed the session");
                break;
            }
            EnginePacket::Message(body) => {
                if let Ok(SocketPacket::Disconnect) = SocketPacket::decode(&body) {
                    info!("Server dropped us from the namespace");
                    break;
                }
            }
            _ => {}
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const OPEN: &str = concat!(
        r#"0{"sid":"test-sid","upgrades":[],"#,
        r#""pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#
    );

    async fn next_message(ws: &mut WebSocketStream<TcpStream>) -> Message {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(message)) => return message,
                other => panic!("server stream ended: {:?}", other),
            }
        }
    }

    /// Minimal Socket.IO server: handshake, one ping, one binary event, then close
    async fn spawn_server() -> (Url, JoinHandle<Vec<Message>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            assert_eq!(next_message(&mut ws).await, Message::Text("40".to_string()));
            ws.send(Message::Text(r#"40{"sid":"ns-sid"}"#.to_string())).await.unwrap();

            ws.send(Message::Text("2".to_string())).await.unwrap();
            let mut received = vec![next_message(&mut ws).await];
            received.push(next_message(&mut ws).await);
            received.push(next_message(&mut ws).await);

            ws.send(Message::Text("1".to_string())).await.unwrap();
            received
        });

        (Url::parse(&format!("ws://{}", addr)).unwrap(), handle)
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (url, server) = spawn_server().await;
        let transport = SocketIoTransport::new();
        assert!(!transport.is_connected());

        transport.connect(&url).await.unwrap();
        assert!(transport.is_connected());

        transport
            .emit("message", Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]))
            .await
            .unwrap();

        let mut received = server.await.unwrap();
        received.sort_by_key(|m| !matches!(m, Message::Text(t) if t == "3"));
        assert_eq!(received[0], Message::Text("3".to_string()));
        assert!(received.contains(&Message::Text(
            r#"451-["message",{"_placeholder":true,"num":0}]"#.to_string()
        )));
        assert!(received.contains(&Message::Binary(vec![0xde, 0xad, 0xbe, 0xef])));

        for _ in 0..100 {
            if !transport.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.emit("message", Bytes::from_static(b"x")).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_interrupted_emit_discards_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stalled_tx, stalled_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            let _ = next_message(&mut ws).await;
            ws.send(Message::Text(r#"40{"sid":"ns-sid"}"#.to_string()))
                .await
                .unwrap();

            // hold the socket open without reading
            let _ = stalled_rx.await;
            drop(ws);
        });

        let transport = SocketIoTransport::new();
        let url = Url::parse(&format!("ws://{}", addr)).unwrap();
        transport.connect(&url).await.unwrap();

        let payload = Bytes::from(vec![0u8; 32 * 1024 * 1024]);
        let attempt = tokio::time::timeout(
            Duration::from_millis(300),
            transport.emit("message", payload),
        )
        .await;

        assert!(attempt.is_err());
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.emit("message", Bytes::from_static(b"x")).await,
            Err(Error::NotConnected)
        ));
        let _ = stalled_tx.send(());
    }

    #[tokio::test]
    async fn test_namespace_refusal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(OPEN.to_string())).await.unwrap();
            let _ = next_message(&mut ws).await;
            ws.send(Message::Text(r#"44{"message":"Not authorized"}"#.to_string()))
                .await
                .unwrap();
        });

        let transport = SocketIoTransport::new();
        let url = Url::parse(&format!("ws://{}", addr)).unwrap();
        let err = transport.connect(&url).await.unwrap_err();
        assert!(err.to_string().contains("Not authorized"));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = SocketIoTransport::new();
        let url = Url::parse(&format!("ws://{}", addr)).unwrap();
        let err = transport.connect(&url).await.unwrap_err();
        assert!(err.is_transport());
    }
}
