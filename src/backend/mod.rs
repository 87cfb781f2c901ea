//! Document store client boundary.
//!
//! # Data Flow
//! ```text
//! registry (ConnectTarget)
//!     → Connector::connect          (socket / replica set discovery)
//!     → Connection::authenticate    (per database credential)
//!     → Connection::find_file       (<root>.files, first match)
//!     → Connection::open_chunk      (<root>.chunks, {files_id, n} sorted by n)
//!     → ChunkCursor::next_chunk     (binary payload)
//! ```
//!
//! # Design Decisions
//! - The wire protocol lives behind these traits; the gateway never sees it
//! - Every failure is classified here so retry decisions never inspect driver errors
//! - Cursors release their server-side resources on drop

pub mod memory;
pub mod mongo;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::LookupField;
use crate::gridfs::key::ObjectKey;

pub type BackendResult<T> = Result<T, BackendError>;

/// Failures reported by the backend boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection- or protocol-level fault expected to clear after reconnecting.
    #[error("transient backend fault: {0}")]
    Transient(String),

    /// Could not establish a connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A credential was rejected.
    #[error("authentication failed for '{username}' on '{database}': {reason}")]
    Auth {
        database: String,
        username: String,
        reason: String,
    },

    /// The backend rejected the query itself.
    #[error("query failed: {0}")]
    Query(String),

    /// A document did not have the expected GridFS shape.
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether reconnecting may clear this fault.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_) | BackendError::Connect(_))
    }
}

/// Host and port of one backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Where a connection group connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Single(Endpoint),
    ReplicaSet { name: String, seeds: Vec<Endpoint> },
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectTarget::Single(endpoint) => write!(f, "{endpoint}"),
            ConnectTarget::ReplicaSet { name, seeds } => {
                write!(f, "{name}/")?;
                for (i, seed) in seeds.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{seed}")?;
                }
                Ok(())
            }
        }
    }
}

/// Single-field equality filter on the files collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub field: LookupField,
    pub key: ObjectKey,
}

/// A files-collection document, as far as the gateway cares.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDocument {
    /// `_id`, which chunk documents reference as `files_id`.
    pub id: ObjectKey,
    pub length: i64,
    pub chunk_size: i64,
    pub content_type: Option<String>,
    pub gzipped: bool,
}

/// Opens connections to a target.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &ConnectTarget) -> BackendResult<Arc<dyn Connection>>;
}

/// A live connection (single node or replica set client).
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Authenticate `username` against `database` on this connection.
    async fn authenticate(&self, database: &str, username: &str, password: &str)
        -> BackendResult<()>;

    /// Zero-result query used to verify access to `database`.
    async fn check_access(&self, database: &str, collection: &str) -> BackendResult<()>;

    /// First document of `collection` matching `filter`.
    async fn find_file(
        &self,
        database: &str,
        collection: &str,
        filter: &FileFilter,
    ) -> BackendResult<Option<FileDocument>>;

    /// Open a cursor over chunk `n` of the file identified by `files_id`.
    async fn open_chunk(
        &self,
        database: &str,
        collection: &str,
        files_id: &ObjectKey,
        n: u64,
    ) -> BackendResult<Box<dyn ChunkCursor>>;
}

/// Cursor over chunk documents. Dropping it releases the server-side cursor.
#[async_trait]
pub trait ChunkCursor: Send {
    /// Payload of the next chunk document, `None` when exhausted.
    async fn next_chunk(&mut self) -> BackendResult<Option<Bytes>>;
}
