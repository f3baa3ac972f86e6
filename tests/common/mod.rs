//! Shared utilities for integration tests.

use std::net::SocketAddr;

use httpserve::config::ServerConfig;
use httpserve::http::{HttpHandler, HttpServer};
use httpserve::lifecycle::Shutdown;
use tokio::net::TcpListener;

/// A server running on an ephemeral port. Dropping it shuts the server down.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults bound to loopback, websockets toggled by `websocket`.
pub fn test_config(websocket: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.websocket.enabled = websocket;
    config
}

/// Bind `127.0.0.1:0` and serve `handler` in the background.
///
/// The listener is bound before this returns, so requests can be sent
/// immediately.
pub async fn spawn_server<H: HttpHandler>(mut config: ServerConfig, handler: H) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.port = addr.port();

    let shutdown = Shutdown::new();
    let server = HttpServer::with_config(config, handler);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener, server_shutdown).await {
            eprintln!("test server failed: {e}");
        }
    });

    TestServer { addr, shutdown }
}

/// `Authorization` header value for basic auth.
#[allow(dead_code)]
pub fn basic_auth(user: &str, password: &str) -> String {
    use base64::Engine;
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}"))
    )
}
