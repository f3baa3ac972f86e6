//! Application extension points of the server.

use std::future::Future;

use crate::http::{HttpError, HttpServerRequest, HttpServerResponse};
use crate::websocket::WebsocketHandler;

/// Body written by the default [`HttpHandler::handle`].
pub const DEFAULT_PAGE: &str = "It works! Override the handle() method to handle requests.";

/// Request handling logic plugged into [`HttpServer`](crate::http::HttpServer).
///
/// `handle` runs once per ordinary request. For websocket upgrades the
/// server asks `on_accept` whether to proceed and `on_handle` for the
/// handler that will own the connection.
pub trait HttpHandler: Send + Sync + 'static {
    /// Serve one request. An `Err` becomes a `500` response.
    fn handle(
        &self,
        _req: &mut HttpServerRequest,
        res: &mut HttpServerResponse,
    ) -> impl Future<Output = Result<(), HttpError>> + Send {
        async move {
            res.print(DEFAULT_PAGE)?;
            Ok(())
        }
    }

    /// Decide whether an upgrade request may proceed.
    fn on_accept(&self, _req: &HttpServerRequest, _res: &mut HttpServerResponse) -> bool {
        true
    }

    /// Pick the websocket handler for an accepted upgrade to `target`.
    /// `None` rejects the upgrade.
    fn on_handle(&self, _target: &str) -> Option<Box<dyn WebsocketHandler>> {
        None
    }
}
