//! Persistent connection abstraction
//!
//! The client only needs four primitives from the session layer: connect,
//! a liveness predicate, emit and disconnect. Production code uses
//! [`SocketIoTransport`](crate::socketio::SocketIoTransport); tests plug in an
//! in-memory fake.

use crate::Result;
use bytes::Bytes;
use std::future::Future;
use url::Url;

/// Connection-oriented session carrying named binary events
///
/// Implementations own their internal state and must be safe to share between
/// the keepalive and discard tasks.
pub trait Transport: Send + Sync + 'static {
    /// Open a session to `url`
    fn connect(&self, url: &Url) -> impl Future<Output = Result<()>> + Send;

    /// Whether the session is currently usable
    fn is_connected(&self) -> bool;

    /// Send `payload` as a binary event named `event`
    fn emit(&self, event: &str, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Close the session if one is open
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::Error;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every emit; connect and emit outcomes are switchable
    pub(crate) struct FakeTransport {
        connected: AtomicBool,
        accept_connect: AtomicBool,
        fail_emit: AtomicBool,
        // calls never complete while set
        hang_connect: AtomicBool,
        hang_emit: AtomicBool,
        connect_calls: AtomicUsize,
        emitted: Mutex<Vec<(String, Bytes)>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> Self {
            Self {
                connected: AtomicBool::new(false),
                accept_connect: AtomicBool::new(true),
                fail_emit: AtomicBool::new(false),
                hang_connect: AtomicBool::new(false),
                hang_emit: AtomicBool::new(false),
                connect_calls: AtomicUsize::new(0),
                emitted: Mutex::new(Vec::new()),
            }
        }

        /// A transport that refuses every connect attempt
        pub(crate) fn unreachable() -> Self {
            let fake = Self::new();
            fake.set_reachable(false);
            fake
        }

        pub(crate) fn set_reachable(&self, reachable: bool) {
            self.accept_connect.store(reachable, Ordering::SeqCst);
            if !reachable {
                self.connected.store(false, Ordering::SeqCst);
            }
        }

        pub(crate) fn set_fail_emit(&self, fail: bool) {
            self.fail_emit.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn set_hang_connect(&self, hang: bool) {
            self.hang_connect.store(hang, Ordering::SeqCst);
        }

        pub(crate) fn set_hang_emit(&self, hang: bool) {
            self.hang_emit.store(hang, Ordering::SeqCst);
        }

        pub(crate) fn connect_calls(&self) -> usize {
            self.connect_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn emitted(&self) -> Vec<(String, Bytes)> {
            self.emitted.lock().clone()
        }

        pub(crate) fn emit_count(&self) -> usize {
            self.emitted.lock().len()
        }
    }

    impl Transport for FakeTransport {
        async fn connect(&self, _url: &Url) -> Result<()> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang_connect.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.accept_connect.load(Ordering::SeqCst) {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(Error::Protocol("connection refused".to_string()))
            }
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn emit(&self, event: &str, payload: Bytes) -> Result<()> {
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            if self.hang_emit.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail_emit.load(Ordering::SeqCst) {
                return Err(Error::Protocol("emit rejected".to_string()));
            }
            self.emitted.lock().push((event.to_string(), payload));
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }
}
