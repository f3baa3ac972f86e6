//! Drives one upgraded socket through its handler.
//!
//! # Data Flow
//! ```text
//! Connection::send/close ──mpsc──→ writer task ──→ socket sink
//! socket stream ──→ reader loop ──→ WebsocketHandler callbacks
//! ```
//!
//! The reader loop also watches the idle timeout, the connection's
//! disconnect signal and server shutdown. `on_close` fires exactly once.

use std::fmt::Display;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::observability::metrics;
use crate::websocket::connection::{CLOSE_ABNORMAL, CLOSE_GOING_AWAY, CLOSE_NORMAL, CLOSE_NO_STATUS};
use crate::websocket::{Connection, ConnectionInfo, Outbound, WebsocketHandler};

enum Event {
    Message(Message),
    Error(String),
    Ended,
    Idle,
    Disconnected,
    Shutdown,
}

/// Run `handler` over `socket` until the connection ends.
pub async fn run_connection(
    socket: WebSocket,
    mut handler: Box<dyn WebsocketHandler>,
    info: ConnectionInfo,
    mut shutdown: broadcast::Receiver<()>,
) {
    let (conn, rx) = Connection::new(info);
    let (sink, mut stream) = socket.split();
    let (finish, finished) = oneshot::channel();
    let writer = tokio::spawn(write_loop(sink, rx, conn.clone(), finished));
    let mut disconnect = conn.disconnect_signal();

    metrics::websocket_opened();
    tracing::info!(
        connection_id = %conn.id(),
        remote = %conn.remote_address().host_str,
        "Websocket connected"
    );
    handler.on_connect(&conn);

    let mut closed = false;
    loop {
        let idle = conn.idle_duration();
        let event = tokio::select! {
            _ = disconnect.changed() => Event::Disconnected,
            _ = shutdown.recv() => Event::Shutdown,
            event = async {
                let next = stream.next();
                let item = match idle {
                    Some(limit) => match tokio::time::timeout(limit, next).await {
                        Ok(item) => item,
                        Err(_) => return Event::Idle,
                    },
                    None => next.await,
                };
                match item {
                    Some(Ok(msg)) => Event::Message(msg),
                    Some(Err(e)) => Event::Error(e.to_string()),
                    None => Event::Ended,
                }
            } => event,
        };

        match event {
            Event::Message(Message::Text(text)) => {
                metrics::record_websocket_message("in", "text");
                handler.on_text(&conn, text.as_str());
            }
            Event::Message(Message::Binary(data)) => {
                metrics::record_websocket_message("in", "binary");
                handler.on_binary(&conn, data);
            }
            Event::Message(Message::Ping(_)) | Event::Message(Message::Pong(_)) => {
                tracing::trace!(connection_id = %conn.id(), "Control frame received");
            }
            Event::Message(Message::Close(frame)) => {
                let (code, reason) = frame
                    .map(|f| (f.code, f.reason.as_str().to_string()))
                    .unwrap_or((CLOSE_NO_STATUS, String::new()));
                conn.mark_closed();
                if !closed {
                    closed = true;
                    handler.on_close(&conn, code, &reason);
                }
                // Keep reading so the transport can finish the handshake.
            }
            Event::Error(error) => {
                tracing::warn!(connection_id = %conn.id(), error = %error, "Websocket error");
                handler.on_error(&conn, &error);
                break;
            }
            Event::Ended => break,
            Event::Idle => {
                tracing::debug!(connection_id = %conn.id(), "Websocket idle timeout");
                let _ = conn.close_with(CLOSE_GOING_AWAY, "Idle Timeout");
                if !closed {
                    closed = true;
                    handler.on_close(&conn, CLOSE_GOING_AWAY, "Idle Timeout");
                }
                break;
            }
            Event::Shutdown => {
                let _ = conn.close_with(CLOSE_GOING_AWAY, "Server Shutdown");
                if !closed {
                    closed = true;
                    handler.on_close(&conn, CLOSE_GOING_AWAY, "Server Shutdown");
                }
                break;
            }
            Event::Disconnected => {
                if !closed {
                    closed = true;
                    handler.on_close(&conn, CLOSE_ABNORMAL, "Disconnected");
                }
                writer.abort();
                break;
            }
        }
    }

    if !closed {
        handler.on_close(&conn, CLOSE_ABNORMAL, "");
    }
    conn.mark_closed();
    // The writer sends what is already queued, then stops.
    let _ = finish.send(());
    let _ = writer.await;

    metrics::websocket_closed();
    tracing::info!(connection_id = %conn.id(), "Websocket closed");
}

/// Forward queued frames to `sink`.
///
/// Stops at once on a hard disconnect, dropping anything still queued.
/// Once `finished` fires it sends what is already queued and stops.
async fn write_loop<S>(
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    conn: Connection,
    mut finished: oneshot::Receiver<()>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut disconnect = conn.disconnect_signal();
    let mut finishing = false;
    loop {
        if *disconnect.borrow() {
            break;
        }
        let item = if finishing {
            rx.try_recv().ok()
        } else {
            tokio::select! {
                biased;
                _ = disconnect.changed() => break,
                item = rx.recv() => item,
                _ = &mut finished => {
                    finishing = true;
                    continue;
                }
            }
        };
        let Some(item) = item else { break };

        let (result, kind) = match item {
            Outbound::Text(text) => (sink.send(Message::Text(text.into())).await, "text"),
            Outbound::Binary(data) => (sink.send(Message::Binary(data)).await, "binary"),
            Outbound::Ping(data) => (sink.send(Message::Ping(data)).await, "ping"),
            Outbound::Pong(data) => (sink.send(Message::Pong(data)).await, "pong"),
            Outbound::Flush => (sink.flush().await, "flush"),
            Outbound::Close(frame) => {
                let (code, reason) = frame.unwrap_or((CLOSE_NORMAL, String::new()));
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                (sink.send(Message::Close(Some(frame))).await, "close")
            }
        };

        match result {
            Ok(()) => {
                if kind != "flush" {
                    metrics::record_websocket_message("out", kind);
                }
            }
            Err(e) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Websocket write failed");
                break;
            }
        }
    }
}
