//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry/failover configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin endpoint settings.
    pub admin: AdminConfig,

    /// Named backend connection groups.
    pub connections: Vec<ConnectionConfig>,

    /// Locations mapping path prefixes to GridFS buckets.
    pub locations: Vec<LocationConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce response headers, in seconds.
    /// The streamed body is not bounded by this.
    pub request_secs: u64,

    /// Backend connect / server selection timeout in seconds.
    pub connect_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            connect_secs: 5,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Reconnect-and-retry cycles allowed per request, shared by the
    /// metadata lookup and every chunk fetch of that request.
    pub max_retries: u32,

    /// Fixed wait between tearing down a connection and re-establishing it.
    pub reconnect_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            reconnect_backoff_ms: 500,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin listener bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// A named backend connection group.
///
/// Either `address` or `replica_set` + `seeds` is given. With neither, the
/// group connects to [`DEFAULT_BACKEND_ADDRESS`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Group name referenced by locations.
    pub name: String,

    /// Single endpoint, "host:port".
    #[serde(default)]
    pub address: Option<String>,

    /// Replica set name.
    #[serde(default)]
    pub replica_set: Option<String>,

    /// Replica set seed list, "host:port" each.
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Endpoint used by a connection group that declares no address.
pub const DEFAULT_BACKEND_ADDRESS: &str = "127.0.0.1:27017";

/// Maximum number of replica set seeds accepted per group.
pub const MAX_REPLICA_SEEDS: usize = 8;

/// Minimum number of replica set seeds accepted per group.
pub const MIN_REPLICA_SEEDS: usize = 2;

/// A location serving one GridFS bucket under a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationConfig {
    /// Path prefix (e.g., "/media/"). The rest of the path is the key.
    pub prefix: String,

    /// Connection group name.
    pub connection: String,

    /// Database holding the bucket.
    #[serde(default)]
    pub database: String,

    /// Bucket root; collections are `<root>.files` and `<root>.chunks`.
    #[serde(default = "default_root_collection")]
    pub root_collection: String,

    /// Metadata field the key is matched against.
    #[serde(default)]
    pub field: LookupField,

    /// How the key segment is interpreted.
    #[serde(default)]
    pub key_type: KeyType,

    /// Optional credential applied to the connection group for `database`.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_root_collection() -> String {
    "fs".to_string()
}

/// Metadata field used for lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum LookupField {
    #[default]
    #[serde(rename = "_id")]
    Id,
    #[serde(rename = "filename")]
    Filename,
}

impl LookupField {
    /// Document field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupField::Id => "_id",
            LookupField::Filename => "filename",
        }
    }
}

/// Type of the lookup key carried in the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    #[serde(alias = "object_id")]
    ObjectId,
    String,
    #[serde(alias = "integer")]
    Int,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::ObjectId => write!(f, "objectid"),
            KeyType::String => write!(f, "string"),
            KeyType::Int => write!(f, "int"),
        }
    }
}
