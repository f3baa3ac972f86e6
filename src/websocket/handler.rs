//! Websocket callback interface.

use axum::body::Bytes;

use crate::websocket::Connection;

/// Callbacks for one websocket connection.
///
/// An instance is produced per accepted upgrade by
/// [`HttpHandler::on_handle`](crate::http::HttpHandler::on_handle). Every
/// method defaults to a no-op; implement the ones you need and use the
/// [`Connection`] argument to reply.
pub trait WebsocketHandler: Send + 'static {
    /// The upgrade completed and the connection is open.
    fn on_connect(&mut self, _conn: &Connection) {}

    fn on_text(&mut self, _conn: &Connection, _text: &str) {}

    fn on_binary(&mut self, _conn: &Connection, _data: Bytes) {}

    /// Called once when the connection ends, whichever side ended it.
    fn on_close(&mut self, _conn: &Connection, _status_code: u16, _reason: &str) {}

    fn on_error(&mut self, _conn: &Connection, _error: &str) {}
}
