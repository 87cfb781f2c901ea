//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend call (metadata lookup, chunk fetch, initial connect):
//!     → retries.rs (attempt, classify, spend budget)
//!     → On transient fault: registry reconnect
//!         → backoff.rs (fixed wait before re-establishing)
//!         → reauthenticate, then attempt again
//! ```
//!
//! # Design Decisions
//! - Retries are bounded per request, never per call
//! - Reconnects use a fixed interval; the registry single-flights them

pub mod backoff;
pub mod retries;

pub use backoff::Backoff;
pub use retries::{RetryBudget, RetryPolicy};
