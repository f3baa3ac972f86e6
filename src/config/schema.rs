//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! Unknown keys are rejected so that a misspelled option fails loudly
//! instead of silently falling back to its default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener configuration (bind host/port, TLS).
    pub listener: ListenerConfig,

    /// Request concurrency and runtime sizing.
    pub threads: ThreadConfig,

    /// Websocket upgrade settings.
    pub websocket: WebsocketConfig,

    /// Server-side session settings.
    pub session: SessionConfig,

    /// Body and timeout limits.
    pub limits: LimitsConfig,

    /// Request parsing defaults.
    pub request: RequestConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenerConfig {
    /// Host or interface to bind ("localhost", "127.0.0.1", "0.0.0.0").
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl ListenerConfig {
    /// `host:port` string suitable for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Thread/concurrency sizing.
///
/// `max` bounds the number of requests executing at once (0 = unbounded).
/// `min` is the number of runtime worker threads used by
/// [`HttpServer::start_blocking`](crate::http::HttpServer::start_blocking)
/// (0 = runtime default). Unless `max` is 0 it must not be below `min`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadConfig {
    pub max: usize,
    pub min: usize,
}

/// Websocket configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebsocketConfig {
    /// Accept websocket upgrade requests.
    pub enabled: bool,

    /// Initial idle timeout of a connection in milliseconds (0 = none).
    pub idle_timeout_ms: u64,

    /// Largest accepted inbound message.
    pub max_message_bytes: usize,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            idle_timeout_ms: 0,
            max_message_bytes: 64 * 1024,
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session id.
    pub cookie_name: String,

    /// Seconds of inactivity before a session expires (<= 0 never expires).
    pub max_inactive_secs: i64,

    /// How often expired sessions are purged.
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "SESSIONID".to_string(),
            max_inactive_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum request body size, multipart bodies included.
    pub max_body_bytes: usize,

    /// Total time allowed for a request in seconds.
    pub request_timeout_secs: u64,

    /// How long in-flight requests may drain after shutdown, in
    /// milliseconds (0 = wait for all of them).
    pub shutdown_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 30,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Request parsing defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestConfig {
    /// Locale reported when the client sends no `Accept-Language`.
    pub default_locale: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_locale: "en-US".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
