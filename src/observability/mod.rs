//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handling, streaming, reconnects:
//!     → logging.rs (structured events, request ID on every request span)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
