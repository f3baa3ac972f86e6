//! Websocket session subsystem.
//!
//! # Data Flow
//! ```text
//! Upgrade request
//!     → HttpHandler::on_accept (gate)
//!     → HttpHandler::on_handle (pick a WebsocketHandler)
//!     → runner.rs (reader loop + writer task)
//!     → handler.rs callbacks, replying through connection.rs
//! ```
//!
//! # Design Decisions
//! - Handler state and connection plumbing are separate types
//! - Broadcasting goes through an injected `ConnectionRegistry`

pub mod connection;
pub mod handler;
pub mod registry;
pub mod runner;

pub use connection::{Connection, ConnectionId, ConnectionInfo, Endpoint, Outbound, Payload, WebsocketError};
pub use handler::WebsocketHandler;
pub use registry::ConnectionRegistry;
pub use runner::run_connection;
