//! HTTP transaction subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, upgrade detection)
//!     → request.rs (populate HttpServerRequest in one pass)
//!     → handler.rs (application HttpHandler::handle)
//!     → response.rs (buffered status, headers, cookies, body)
//!     → Send to client
//! ```
//!
//! Sessions (session.rs) are resolved from the session cookie on demand.

pub mod cookie;
pub mod error;
pub mod handler;
pub mod params;
pub mod part;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod tls;

pub use cookie::Cookie;
pub use error::HttpError;
pub use handler::HttpHandler;
pub use params::ParamValue;
pub use part::HttpPart;
pub use request::{BasicAuth, HttpServerRequest, RemoteUser, RequestContext};
pub use response::HttpServerResponse;
pub use server::{HttpServer, ServerError};
pub use session::{HttpSession, SessionStore};
