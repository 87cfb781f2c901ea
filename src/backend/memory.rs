//! In-process document store.
//!
//! Serves GridFS-shaped data from memory and can inject the faults a real
//! deployment produces: refused connects, severed sockets, and transient
//! query failures. Used by the test suites and for local runs without a
//! database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::backend::{
    BackendError, BackendResult, ChunkCursor, ConnectTarget, Connection, Connector, FileDocument,
    FileFilter,
};
use crate::config::LookupField;
use crate::gridfs::key::ObjectKey;

#[derive(Debug, Clone)]
struct StoredFile {
    filename: Option<String>,
    document: FileDocument,
}

#[derive(Debug, Clone)]
struct StoredChunk {
    files_id: ObjectKey,
    n: u64,
    data: Bytes,
}

#[derive(Debug, Default)]
struct StoreState {
    files: DashMap<String, Vec<StoredFile>>,
    chunks: DashMap<String, Vec<StoredChunk>>,
    users: DashMap<(String, String), String>,

    /// Connections created before the current generation are severed.
    generation: AtomicU64,

    fail_connects: AtomicUsize,
    fail_file_queries: AtomicUsize,
    fail_chunk_fetches: AtomicUsize,

    connects: AtomicUsize,
    authentications: AtomicUsize,
    file_queries: AtomicUsize,
    chunk_fetches: AtomicUsize,
    open_cursors: Arc<AtomicUsize>,
}

/// Handle to a shared in-memory store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` as a GridFS file split into `chunk_size` chunks.
    pub fn put_file(
        &self,
        database: &str,
        root: &str,
        id: ObjectKey,
        filename: Option<&str>,
        content_type: Option<&str>,
        chunk_size: usize,
        data: &[u8],
    ) {
        self.insert_file_document(
            database,
            root,
            filename,
            FileDocument {
                id: id.clone(),
                length: data.len() as i64,
                chunk_size: chunk_size as i64,
                content_type: content_type.map(str::to_string),
                gzipped: false,
            },
        );
        for (n, chunk) in data.chunks(chunk_size.max(1)).enumerate() {
            self.insert_chunk(database, root, id.clone(), n as u64, Bytes::copy_from_slice(chunk));
        }
    }

    /// Insert a files-collection document as-is.
    pub fn insert_file_document(
        &self,
        database: &str,
        root: &str,
        filename: Option<&str>,
        document: FileDocument,
    ) {
        self.state
            .files
            .entry(namespace(database, &format!("{root}.files")))
            .or_default()
            .push(StoredFile {
                filename: filename.map(str::to_string),
                document,
            });
    }

    /// Insert a chunks-collection document as-is.
    pub fn insert_chunk(&self, database: &str, root: &str, files_id: ObjectKey, n: u64, data: Bytes) {
        self.state
            .chunks
            .entry(namespace(database, &format!("{root}.chunks")))
            .or_default()
            .push(StoredChunk { files_id, n, data });
    }

    /// Require authentication for `database`.
    pub fn add_user(&self, database: &str, username: &str, password: &str) {
        self.state.users.insert(
            (database.to_string(), username.to_string()),
            password.to_string(),
        );
    }

    /// Sever every live connection; their next operation fails transiently.
    pub fn sever_connections(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Refuse the next `n` connect attempts.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` metadata queries with a transient fault.
    pub fn fail_next_file_queries(&self, n: usize) {
        self.state.fail_file_queries.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` chunk fetches with a transient fault.
    pub fn fail_next_chunk_fetches(&self, n: usize) {
        self.state.fail_chunk_fetches.store(n, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn authentications(&self) -> usize {
        self.state.authentications.load(Ordering::SeqCst)
    }

    pub fn file_queries(&self) -> usize {
        self.state.file_queries.load(Ordering::SeqCst)
    }

    pub fn chunk_fetches(&self) -> usize {
        self.state.chunk_fetches.load(Ordering::SeqCst)
    }

    /// Chunk cursors opened and not yet dropped.
    pub fn open_cursors(&self) -> usize {
        self.state.open_cursors.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryStore {
    async fn connect(&self, target: &ConnectTarget) -> BackendResult<Arc<dyn Connection>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.state.fail_connects) {
            return Err(BackendError::Connect(format!("{target}: connection refused")));
        }
        Ok(Arc::new(MemoryConnection {
            state: self.state.clone(),
            generation: self.state.generation.load(Ordering::SeqCst),
            authenticated: DashMap::new(),
        }))
    }
}

struct MemoryConnection {
    state: Arc<StoreState>,
    generation: u64,
    authenticated: DashMap<String, String>,
}

impl MemoryConnection {
    fn check_alive(&self) -> BackendResult<()> {
        if self.generation != self.state.generation.load(Ordering::SeqCst) {
            return Err(BackendError::Transient("socket closed".into()));
        }
        Ok(())
    }

    fn check_authorized(&self, database: &str) -> BackendResult<()> {
        let protected = self.state.users.iter().any(|entry| entry.key().0 == database);
        if protected && !self.authenticated.contains_key(database) {
            return Err(BackendError::Query(format!("not authorized on {database}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn authenticate(
        &self,
        database: &str,
        username: &str,
        password: &str,
    ) -> BackendResult<()> {
        self.check_alive()?;
        self.state.authentications.fetch_add(1, Ordering::SeqCst);

        let key = (database.to_string(), username.to_string());
        match self.state.users.get(&key) {
            Some(expected) if expected.value() == password => {
                self.authenticated
                    .insert(database.to_string(), username.to_string());
                Ok(())
            }
            _ => Err(BackendError::Auth {
                database: database.to_string(),
                username: username.to_string(),
                reason: "bad credentials".into(),
            }),
        }
    }

    async fn check_access(&self, database: &str, _collection: &str) -> BackendResult<()> {
        self.check_alive()?;
        self.check_authorized(database)
    }

    async fn find_file(
        &self,
        database: &str,
        collection: &str,
        filter: &FileFilter,
    ) -> BackendResult<Option<FileDocument>> {
        self.state.file_queries.fetch_add(1, Ordering::SeqCst);
        self.check_alive()?;
        if take_one(&self.state.fail_file_queries) {
            return Err(BackendError::Transient("primary stepped down".into()));
        }
        self.check_authorized(database)?;

        let Some(files) = self.state.files.get(&namespace(database, collection)) else {
            return Ok(None);
        };
        let found = files.iter().find(|file| match filter.field {
            LookupField::Id => file.document.id == filter.key,
            LookupField::Filename => match (&filter.key, &file.filename) {
                (ObjectKey::String(wanted), Some(name)) => wanted == name,
                _ => false,
            },
        });
        Ok(found.map(|file| file.document.clone()))
    }

    async fn open_chunk(
        &self,
        database: &str,
        collection: &str,
        files_id: &ObjectKey,
        n: u64,
    ) -> BackendResult<Box<dyn ChunkCursor>> {
        self.state.chunk_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_alive()?;
        if take_one(&self.state.fail_chunk_fetches) {
            return Err(BackendError::Transient("connection reset".into()));
        }
        self.check_authorized(database)?;

        let payloads = match self.state.chunks.get(&namespace(database, collection)) {
            Some(chunks) => {
                let mut matching: Vec<&StoredChunk> = chunks
                    .iter()
                    .filter(|chunk| &chunk.files_id == files_id && chunk.n == n)
                    .collect();
                matching.sort_by_key(|chunk| chunk.n);
                matching.into_iter().map(|chunk| chunk.data.clone()).collect()
            }
            None => VecDeque::new(),
        };

        self.state.open_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryChunkCursor {
            payloads,
            open_cursors: self.state.open_cursors.clone(),
        }))
    }
}

struct MemoryChunkCursor {
    payloads: VecDeque<Bytes>,
    open_cursors: Arc<AtomicUsize>,
}

#[async_trait]
impl ChunkCursor for MemoryChunkCursor {
    async fn next_chunk(&mut self) -> BackendResult<Option<Bytes>> {
        Ok(self.payloads.pop_front())
    }
}

impl Drop for MemoryChunkCursor {
    fn drop(&mut self) {
        self.open_cursors.fetch_sub(1, Ordering::SeqCst);
    }
}

fn namespace(database: &str, collection: &str) -> String {
    format!("{database}.{collection}")
}

/// Decrement `counter` if positive; true when a unit was taken.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Endpoint;

    fn target() -> ConnectTarget {
        ConnectTarget::Single(Endpoint {
            host: "memory".into(),
            port: 27017,
        })
    }

    #[tokio::test]
    async fn test_find_by_filename() {
        let store = MemoryStore::new();
        store.put_file(
            "media",
            "fs",
            ObjectKey::Int(1),
            Some("a.txt"),
            Some("text/plain"),
            4,
            b"hello world",
        );
        let conn = store.connect(&target()).await.unwrap();

        let filter = FileFilter {
            field: LookupField::Filename,
            key: ObjectKey::String("a.txt".into()),
        };
        let file = conn.find_file("media", "fs.files", &filter).await.unwrap().unwrap();
        assert_eq!(file.length, 11);
        assert_eq!(file.id, ObjectKey::Int(1));

        let mut cursor = conn
            .open_chunk("media", "fs.chunks", &file.id, 2)
            .await
            .unwrap();
        assert_eq!(store.open_cursors(), 1);
        assert_eq!(cursor.next_chunk().await.unwrap().unwrap(), Bytes::from_static(b"rld"));
        assert_eq!(cursor.next_chunk().await.unwrap(), None);
        drop(cursor);
        assert_eq!(store.open_cursors(), 0);
    }

    #[tokio::test]
    async fn test_severed_connection_is_transient() {
        let store = MemoryStore::new();
        let conn = store.connect(&target()).await.unwrap();
        store.sever_connections();

        let err = conn.check_access("media", "access").await.unwrap_err();
        assert!(err.is_transient());

        let fresh = store.connect(&target()).await.unwrap();
        assert!(fresh.check_access("media", "access").await.is_ok());
    }

    #[tokio::test]
    async fn test_authentication_required() {
        let store = MemoryStore::new();
        store.add_user("media", "reader", "secret");
        let conn = store.connect(&target()).await.unwrap();

        assert!(matches!(
            conn.check_access("media", "access").await,
            Err(BackendError::Query(_))
        ));
        assert!(matches!(
            conn.authenticate("media", "reader", "wrong").await,
            Err(BackendError::Auth { .. })
        ));
        conn.authenticate("media", "reader", "secret").await.unwrap();
        assert!(conn.check_access("media", "access").await.is_ok());
    }

    #[test]
    fn test_take_one() {
        let counter = AtomicUsize::new(1);
        assert!(take_one(&counter));
        assert!(!take_one(&counter));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
