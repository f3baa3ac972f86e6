//! Embeddable HTTP/websocket server with a SOAP/WSDL toolkit.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod soap;
pub mod websocket;

pub use config::schema::ServerConfig;
pub use http::{HttpHandler, HttpServer};
pub use lifecycle::Shutdown;
pub use websocket::WebsocketHandler;
