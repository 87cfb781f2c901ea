//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once at startup by the registry and router
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; connection groups live for the process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ConnectionConfig, GatewayConfig, KeyType, ListenerConfig, LocationConfig,
    LookupField, ObservabilityConfig, RetryConfig, TimeoutConfig,
};
