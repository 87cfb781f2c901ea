//! Read-only HTTP gateway for GridFS objects stored in MongoDB.

pub mod admin;
pub mod backend;
pub mod config;
pub mod error;
pub mod gridfs;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod routing;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::GatewayServer;
pub use lifecycle::{bootstrap, Gateway, Shutdown};
