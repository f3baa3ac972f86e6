//! Per-connection websocket state and outbound operations.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and registries
//! - Hold endpoint, cookie and protocol facts captured at upgrade time
//! - Queue outbound frames for the connection's writer task
//! - Distinguish graceful close from hard disconnect
//!
//! # Design Decisions
//! - `Connection` is a cheap handle (`Arc` inside) so registries can clone it
//! - Frames go through an unbounded channel; senders never block a callback
//! - Disconnect is signalled out of band; frames still queued are dropped

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::http::Cookie;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (idle timeout, server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// No status code was present in the close frame.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Unique identifier for a websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebsocketError {
    #[error("websocket connection {0} is not open")]
    NotOpen(ConnectionId),

    #[error("websocket connection {0} writer has stopped")]
    ChannelClosed(ConnectionId),
}

/// One side of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// `host:port`.
    pub host_str: String,
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            host_str: addr.to_string(),
        }
    }
}

/// Message payload for [`Connection::send`].
///
/// Byte payloads go out as binary frames, strings as text frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(b))
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Binary(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Payload {
    fn from(b: Bytes) -> Self {
        Payload::Binary(b)
    }
}

/// Work item for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Flush,
    /// Close handshake with an optional code and reason.
    Close(Option<(u16, String)>),
}

/// Facts about a connection known when the upgrade completes.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub secure: bool,
    pub protocol_version: String,
    pub cookies: Vec<Cookie>,
    pub idle_timeout_ms: u64,
}

#[derive(Debug)]
struct Inner {
    id: ConnectionId,
    open: AtomicBool,
    secure: bool,
    idle_timeout_ms: AtomicU64,
    local: Endpoint,
    remote: Endpoint,
    protocol_version: String,
    cookies: Vec<Cookie>,
    tx: mpsc::UnboundedSender<Outbound>,
    disconnect: watch::Sender<bool>,
}

/// Handle to one upgraded websocket connection.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a connection and the receiver its writer drains.
    pub fn new(info: ConnectionInfo) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (disconnect, _) = watch::channel(false);
        let conn = Self {
            inner: Arc::new(Inner {
                id: ConnectionId::new(),
                open: AtomicBool::new(true),
                secure: info.secure,
                idle_timeout_ms: AtomicU64::new(info.idle_timeout_ms),
                local: info.local_addr.into(),
                remote: info.remote_addr.into(),
                protocol_version: info.protocol_version,
                cookies: info.cookies,
                tx,
                disconnect,
            }),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Send a text or binary message depending on the payload type.
    pub fn send(&self, data: impl Into<Payload>) -> Result<&Self, WebsocketError> {
        match data.into() {
            Payload::Text(text) => self.push(Outbound::Text(text)),
            Payload::Binary(bytes) => self.push(Outbound::Binary(bytes)),
        }
    }

    /// Flush frames buffered by the transport.
    pub fn flush(&self) -> Result<&Self, WebsocketError> {
        self.push(Outbound::Flush)
    }

    /// Send a ping; `None` sends an empty payload.
    pub fn ping(&self, data: Option<Bytes>) -> Result<&Self, WebsocketError> {
        self.push(Outbound::Ping(data.unwrap_or_default()))
    }

    /// Send a pong; `None` sends an empty payload.
    pub fn pong(&self, data: Option<Bytes>) -> Result<&Self, WebsocketError> {
        self.push(Outbound::Pong(data.unwrap_or_default()))
    }

    /// Start a close handshake with the normal closure code.
    pub fn close(&self) -> Result<&Self, WebsocketError> {
        self.push(Outbound::Close(None))?;
        self.inner.open.store(false, Ordering::Release);
        Ok(self)
    }

    /// Start a close handshake with `code` and `reason`.
    pub fn close_with(&self, code: u16, reason: &str) -> Result<&Self, WebsocketError> {
        self.push(Outbound::Close(Some((code, reason.to_string()))))?;
        self.inner.open.store(false, Ordering::Release);
        Ok(self)
    }

    /// Tear the connection down without a close handshake.
    pub fn disconnect(&self) -> &Self {
        self.inner.open.store(false, Ordering::Release);
        self.inner.disconnect.send_replace(true);
        self
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn is_secure(&self) -> bool {
        self.inner.secure
    }

    /// Idle timeout in milliseconds; 0 disables it.
    pub fn idle_timeout(&self) -> u64 {
        self.inner.idle_timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_idle_timeout(&self, millis: u64) -> &Self {
        self.inner.idle_timeout_ms.store(millis, Ordering::Relaxed);
        self
    }

    pub fn local_address(&self) -> &Endpoint {
        &self.inner.local
    }

    pub fn remote_address(&self) -> &Endpoint {
        &self.inner.remote
    }

    pub fn protocol_version(&self) -> &str {
        &self.inner.protocol_version
    }

    /// Cookies sent with the upgrade request.
    pub fn cookies(&self) -> &[Cookie] {
        &self.inner.cookies
    }

    pub(crate) fn idle_duration(&self) -> Option<Duration> {
        match self.idle_timeout() {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub(crate) fn disconnect_signal(&self) -> watch::Receiver<bool> {
        self.inner.disconnect.subscribe()
    }

    /// Mark the connection closed once the socket is gone.
    pub(crate) fn mark_closed(&self) {
        self.inner.open.store(false, Ordering::Release);
    }

    fn push(&self, item: Outbound) -> Result<&Self, WebsocketError> {
        if !self.is_open() {
            return Err(WebsocketError::NotOpen(self.inner.id));
        }
        self.inner
            .tx
            .send(item)
            .map_err(|_| WebsocketError::ChannelClosed(self.inner.id))?;
        Ok(self)
    }
}

#[cfg(test)]
pub(crate) fn test_info() -> ConnectionInfo {
    ConnectionInfo {
        local_addr: "127.0.0.1:8080".parse().unwrap(),
        remote_addr: "10.1.2.3:40000".parse().unwrap(),
        secure: false,
        protocol_version: "13".into(),
        cookies: vec![Cookie::new("SESSIONID", "abc")],
        idle_timeout_ms: 0,
    }
}
