//! MongoDB driver adapter.
//!
//! # Responsibilities
//! - Build driver clients for single endpoints and replica sets
//! - Keep one authenticated client per credential database
//! - Translate GridFS queries and documents to and from BSON
//! - Classify driver errors into [`BackendError`]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Cursor};

use crate::backend::{
    BackendError, BackendResult, ChunkCursor, ConnectTarget, Connection, Connector, FileDocument,
    FileFilter,
};
use crate::gridfs::key::{ObjectId, ObjectKey};

/// Server error codes that mean "try again on a fresh connection".
const TRANSIENT_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

const AUTH_FAILED_CODE: i32 = 18;

/// Connector backed by the official MongoDB driver.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    connect_timeout: Duration,
}

impl MongoConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, target: &ConnectTarget) -> BackendResult<Arc<dyn Connection>> {
        let client = build_client(target, None, self.connect_timeout)
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        // Clients connect lazily; force server selection now.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| BackendError::Connect(e.to_string()))?;

        tracing::debug!(target = %target, "Backend connection established");

        Ok(Arc::new(MongoConnection {
            target: target.clone(),
            connect_timeout: self.connect_timeout,
            client,
            authenticated: DashMap::new(),
        }))
    }
}

/// A driver client plus the per-database clients created by authentication.
pub struct MongoConnection {
    target: ConnectTarget,
    connect_timeout: Duration,
    client: Client,
    authenticated: DashMap<String, Client>,
}

impl MongoConnection {
    fn client_for(&self, database: &str) -> Client {
        self.authenticated
            .get(database)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| self.client.clone())
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn authenticate(
        &self,
        database: &str,
        username: &str,
        password: &str,
    ) -> BackendResult<()> {
        let auth_error = |reason: String| BackendError::Auth {
            database: database.to_string(),
            username: username.to_string(),
            reason,
        };

        let client = build_client(
            &self.target,
            Some((database, username, password)),
            self.connect_timeout,
        )
        .await
        .map_err(|e| auth_error(e.to_string()))?;

        // The handshake authenticates, so any command surfaces a bad credential.
        match client
            .database(database)
            .run_command(doc! { "ping": 1 }, None)
            .await
        {
            Ok(_) => {}
            Err(e) if is_auth_failure(&e) => return Err(auth_error(e.to_string())),
            Err(e) => return Err(classify(e)),
        }

        self.authenticated.insert(database.to_string(), client);
        Ok(())
    }

    async fn check_access(&self, database: &str, collection: &str) -> BackendResult<()> {
        self.client_for(database)
            .database(database)
            .collection::<Document>(collection)
            .find_one(Some(doc! {}), None)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn find_file(
        &self,
        database: &str,
        collection: &str,
        filter: &FileFilter,
    ) -> BackendResult<Option<FileDocument>> {
        let mut query = Document::new();
        query.insert(filter.field.as_str(), key_to_bson(&filter.key));
        let found = self
            .client_for(database)
            .database(database)
            .collection::<Document>(collection)
            .find_one(Some(query), None)
            .await
            .map_err(classify)?;

        found.as_ref().map(parse_file).transpose()
    }

    async fn open_chunk(
        &self,
        database: &str,
        collection: &str,
        files_id: &ObjectKey,
        n: u64,
    ) -> BackendResult<Box<dyn ChunkCursor>> {
        let n = i64::try_from(n)
            .map_err(|_| BackendError::Query(format!("chunk index {n} out of range")))?;
        let query = doc! { "files_id": key_to_bson(files_id), "n": n };
        let options = FindOptions::builder().sort(doc! { "n": 1 }).build();

        let cursor = self
            .client_for(database)
            .database(database)
            .collection::<Document>(collection)
            .find(Some(query), options)
            .await
            .map_err(classify)?;

        Ok(Box::new(MongoChunkCursor { cursor }))
    }
}

/// Driver cursor; the driver kills the server cursor when it is dropped.
struct MongoChunkCursor {
    cursor: Cursor<Document>,
}

#[async_trait]
impl ChunkCursor for MongoChunkCursor {
    async fn next_chunk(&mut self) -> BackendResult<Option<Bytes>> {
        let Some(mut chunk) = self.cursor.try_next().await.map_err(classify)? else {
            return Ok(None);
        };
        match chunk.remove("data") {
            Some(Bson::Binary(binary)) => Ok(Some(Bytes::from(binary.bytes))),
            Some(other) => Err(BackendError::Malformed(format!(
                "chunk data is {:?}, expected binary",
                other.element_type()
            ))),
            None => Err(BackendError::Malformed("chunk has no data field".into())),
        }
    }
}

async fn build_client(
    target: &ConnectTarget,
    credential: Option<(&str, &str, &str)>,
    connect_timeout: Duration,
) -> Result<Client, MongoError> {
    let mut options = ClientOptions::parse(connection_uri(target, credential)).await?;
    options.app_name = Some("gridfs-gateway".to_string());
    options.connect_timeout = Some(connect_timeout);
    options.server_selection_timeout = Some(connect_timeout);
    Client::with_options(options)
}

/// Connection string for a target, optionally carrying a credential.
fn connection_uri(target: &ConnectTarget, credential: Option<(&str, &str, &str)>) -> String {
    let mut uri = String::from("mongodb://");
    if let Some((_, username, password)) = credential {
        uri.push_str(&urlencoding::encode(username));
        uri.push(':');
        uri.push_str(&urlencoding::encode(password));
        uri.push('@');
    }

    let mut params = Vec::new();
    match target {
        ConnectTarget::Single(endpoint) => {
            uri.push_str(&endpoint.to_string());
            params.push("directConnection=true".to_string());
        }
        ConnectTarget::ReplicaSet { name, seeds } => {
            let hosts: Vec<String> = seeds.iter().map(ToString::to_string).collect();
            uri.push_str(&hosts.join(","));
            params.push(format!("replicaSet={}", urlencoding::encode(name)));
        }
    }
    uri.push('/');

    if let Some((database, _, _)) = credential {
        params.push(format!("authSource={}", urlencoding::encode(database)));
    }
    uri.push('?');
    uri.push_str(&params.join("&"));
    uri
}

fn classify(err: MongoError) -> BackendError {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => BackendError::Transient(err.to_string()),
        ErrorKind::Command(command) if TRANSIENT_CODES.contains(&command.code) => {
            BackendError::Transient(err.to_string())
        }
        _ => BackendError::Query(err.to_string()),
    }
}

fn is_auth_failure(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Authentication { .. } => true,
        ErrorKind::Command(command) => command.code == AUTH_FAILED_CODE,
        _ => false,
    }
}

fn key_to_bson(key: &ObjectKey) -> Bson {
    match key {
        ObjectKey::ObjectId(oid) => Bson::ObjectId(bson::oid::ObjectId::from_bytes(oid.bytes())),
        ObjectKey::String(s) => Bson::String(s.clone()),
        ObjectKey::Int(n) => Bson::Int64(*n),
    }
}

fn bson_to_key(value: &Bson) -> BackendResult<ObjectKey> {
    match value {
        Bson::ObjectId(oid) => Ok(ObjectKey::ObjectId(ObjectId::from_bytes(oid.bytes()))),
        Bson::String(s) => Ok(ObjectKey::String(s.clone())),
        Bson::Int32(n) => Ok(ObjectKey::Int(i64::from(*n))),
        Bson::Int64(n) => Ok(ObjectKey::Int(*n)),
        Bson::Double(f) if f.fract() == 0.0 => Ok(ObjectKey::Int(*f as i64)),
        other => Err(BackendError::Malformed(format!(
            "unsupported _id type {:?}",
            other.element_type()
        ))),
    }
}

fn number(doc: &Document, field: &str) -> Option<i64> {
    match doc.get(field)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn parse_file(doc: &Document) -> BackendResult<FileDocument> {
    let id = doc
        .get("_id")
        .ok_or_else(|| BackendError::Malformed("file has no _id".into()))
        .and_then(bson_to_key)?;
    let length = number(doc, "length")
        .ok_or_else(|| BackendError::Malformed("file has no numeric length".into()))?;
    let chunk_size = number(doc, "chunkSize")
        .ok_or_else(|| BackendError::Malformed("file has no numeric chunkSize".into()))?;
    let content_type = doc.get_str("contentType").ok().map(str::to_string);
    let gzipped = doc
        .get_bool("gzipped")
        .ok()
        .or_else(|| {
            doc.get_document("metadata")
                .ok()
                .and_then(|metadata| metadata.get_bool("gzipped").ok())
        })
        .unwrap_or(false);

    Ok(FileDocument {
        id,
        length,
        chunk_size,
        content_type,
        gzipped,
    })
}
