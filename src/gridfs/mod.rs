//! GridFS read path.
//!
//! # Data Flow
//! ```text
//! path segment
//!     → key.rs (percent-decode, typed ObjectKey)
//!     → metadata.rs (<root>.files lookup → ObjectDescriptor)
//!     → stream.rs (<root>.chunks, n = 0..N-1 → ChunkSink)
//! ```

pub mod key;
pub mod metadata;
pub mod stream;

pub use key::{ObjectId, ObjectKey};
pub use metadata::ObjectDescriptor;
pub use stream::{ChunkSink, SinkClosed, StreamError, StreamSummary};

/// A GridFS bucket: `<root>.files` and `<root>.chunks` in one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub database: String,
    pub root: String,
}

impl Bucket {
    pub fn new(database: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            root: root.into(),
        }
    }

    pub fn files_collection(&self) -> String {
        format!("{}.files", self.root)
    }

    pub fn chunks_collection(&self) -> String {
        format!("{}.chunks", self.root)
    }
}
