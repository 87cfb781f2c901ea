//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, object handler)
//!     → request.rs (request ID)
//!     → [routing picks the location, gridfs resolves and streams]
//!     → response.rs (status mapping, object headers, body channel)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, GatewayServer};
