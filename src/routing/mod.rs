//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path (raw, still percent-encoded)
//!     → router.rs (location lookup, longest prefix first)
//!     → matcher.rs (strip the prefix)
//!     → Return: (Location, key segment) or no match
//!
//! Compilation (at startup):
//!     LocationConfig[] + ConnectionRegistry
//!     → drop locations disabled at startup
//!     → sort by prefix length, longest first
//!     → freeze as immutable LocationRouter
//! ```
//!
//! # Design Decisions
//! - Immutable after startup, shared without locks
//! - Prefix matching only, case-sensitive
//! - Deterministic: the most specific prefix wins

pub mod matcher;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use router::{Location, LocationRouter};
