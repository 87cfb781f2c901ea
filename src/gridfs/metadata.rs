//! Metadata lookup.

use crate::backend::{FileDocument, FileFilter};
use crate::config::LookupField;
use crate::error::GatewayError;
use crate::gridfs::key::ObjectKey;
use crate::gridfs::Bucket;
use crate::registry::ConnectionGroup;
use crate::resilience::{RetryBudget, RetryPolicy};

/// Served when the file document carries no content type.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// What the gateway needs to know to stream one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDescriptor {
    /// Parent id referenced by the chunk documents.
    pub id: ObjectKey,
    pub length: u64,
    pub chunk_size: u64,
    pub chunk_count: u64,
    pub content_type: Option<String>,
    pub gzipped: bool,
}

impl ObjectDescriptor {
    pub fn from_document(document: FileDocument) -> Result<Self, GatewayError> {
        let length = u64::try_from(document.length).map_err(|_| {
            GatewayError::Corrupt(format!("negative length {}", document.length))
        })?;
        let chunk_size = u64::try_from(document.chunk_size).unwrap_or(0);
        if chunk_size == 0 && length > 0 {
            return Err(GatewayError::Corrupt(format!(
                "chunk size {} for {length} bytes",
                document.chunk_size
            )));
        }
        let chunk_count = if length == 0 {
            0
        } else {
            length.div_ceil(chunk_size)
        };

        Ok(Self {
            id: document.id,
            length,
            chunk_size,
            chunk_count,
            content_type: document.content_type,
            gzipped: document.gzipped,
        })
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }

    /// Payload length chunk `n` must have.
    pub fn expected_chunk_len(&self, n: u64) -> u64 {
        let offset = n.saturating_mul(self.chunk_size);
        self.length.saturating_sub(offset).min(self.chunk_size)
    }
}

/// Find the object for `key` in `bucket`, retrying transient faults.
pub async fn lookup(
    policy: &RetryPolicy,
    group: &ConnectionGroup,
    budget: &mut RetryBudget,
    bucket: &Bucket,
    field: LookupField,
    key: &ObjectKey,
) -> Result<ObjectDescriptor, GatewayError> {
    let filter = FileFilter {
        field,
        key: key.clone(),
    };
    let files_collection = bucket.files_collection();

    let filter = &filter;
    let database = bucket.database.as_str();
    let collection = files_collection.as_str();
    let document = policy
        .execute(group, budget, |conn| async move {
            conn.find_file(database, collection, filter).await
        })
        .await?;

    match document {
        Some(document) => ObjectDescriptor::from_document(document),
        None => Err(GatewayError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::backend::{ConnectTarget, Endpoint};
    use crate::resilience::Backoff;
    use std::sync::Arc;

    fn document(length: i64, chunk_size: i64) -> FileDocument {
        FileDocument {
            id: ObjectKey::Int(1),
            length,
            chunk_size,
            content_type: None,
            gzipped: false,
        }
    }

    #[test]
    fn test_chunk_count() {
        let d = ObjectDescriptor::from_document(document(10, 4)).unwrap();
        assert_eq!(d.chunk_count, 3);
        assert_eq!(d.expected_chunk_len(0), 4);
        assert_eq!(d.expected_chunk_len(2), 2);

        let d = ObjectDescriptor::from_document(document(8, 4)).unwrap();
        assert_eq!(d.chunk_count, 2);
        assert_eq!(d.expected_chunk_len(1), 4);

        let d = ObjectDescriptor::from_document(document(0, 255)).unwrap();
        assert_eq!(d.chunk_count, 0);
        assert_eq!(d.content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_corrupt_metadata() {
        assert!(matches!(
            ObjectDescriptor::from_document(document(-1, 4)),
            Err(GatewayError::Corrupt(_))
        ));
        assert!(matches!(
            ObjectDescriptor::from_document(document(10, 0)),
            Err(GatewayError::Corrupt(_))
        ));
        assert!(ObjectDescriptor::from_document(document(0, 0)).is_ok());
    }

    #[tokio::test]
    async fn test_lookup_not_found_issues_one_query() {
        let store = MemoryStore::new();
        let group = ConnectionGroup::new(
            "main",
            ConnectTarget::Single(Endpoint {
                host: "memory".into(),
                port: 27017,
            }),
            Vec::new(),
            Arc::new(store.clone()),
            Backoff::from_millis(0),
        );
        group.establish().await.unwrap();
        let policy = RetryPolicy::new(1);
        let mut budget = policy.budget();

        let err = lookup(
            &policy,
            &group,
            &mut budget,
            &Bucket::new("media", "fs"),
            LookupField::Filename,
            &ObjectKey::String("nope.txt".into()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GatewayError::NotFound));
        assert_eq!(store.file_queries(), 1);
        assert_eq!(budget.used(), 0);
    }

    #[tokio::test]
    async fn test_lookup_returns_descriptor() {
        let store = MemoryStore::new();
        store.put_file(
            "media",
            "images",
            ObjectKey::String("logo".into()),
            None,
            Some("image/png"),
            3,
            b"0123456",
        );
        let group = ConnectionGroup::new(
            "main",
            ConnectTarget::Single(Endpoint {
                host: "memory".into(),
                port: 27017,
            }),
            Vec::new(),
            Arc::new(store.clone()),
            Backoff::from_millis(0),
        );
        group.establish().await.unwrap();
        let policy = RetryPolicy::new(1);

        let descriptor = lookup(
            &policy,
            &group,
            &mut policy.budget(),
            &Bucket::new("media", "images"),
            LookupField::Id,
            &ObjectKey::String("logo".into()),
        )
        .await
        .unwrap();

        assert_eq!(descriptor.length, 7);
        assert_eq!(descriptor.chunk_count, 3);
        assert_eq!(descriptor.content_type(), "image/png");
    }
}
