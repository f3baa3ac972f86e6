//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to HttpServer, which re-validates on start
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the server starts
//! - All fields have defaults to allow minimal configs
//! - Unknown keys are rejected at parse time
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ListenerConfig, LimitsConfig, LogFormat, ObservabilityConfig, RequestConfig, ServerConfig,
    SessionConfig, ThreadConfig, TlsConfig, WebsocketConfig,
};
pub use validation::{validate_config, ValidationError};
