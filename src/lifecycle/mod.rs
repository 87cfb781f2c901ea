//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Build registry → Connect groups
//!     → Check credentials → Compile router
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C or trigger() → Stop accepting → Drain in-flight streams → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then backends, then listeners
//! - A group that cannot connect at startup is retried lazily by requests
//! - A location whose credentials are rejected is not served

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{bootstrap, Gateway, StartupError};
