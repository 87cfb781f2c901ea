//! Chunk streaming engine.
//!
//! # Responsibilities
//! - Fetch chunks `0..chunk_count` strictly in order, one at a time
//! - Hand each payload to a [`ChunkSink`], marking the last one
//! - Verify payload sizes against the descriptor
//!
//! # Design Decisions
//! - No read-ahead: the sink write is the backpressure point, so a slow
//!   client throttles the fetch loop
//! - A cursor is opened lazily per index and dropped once its chunk is
//!   written; every exit path (error, closed sink, cancelled task) drops it
//! - A closed sink stops the loop without further fetches or retries

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::backend::BackendError;
use crate::error::GatewayError;
use crate::gridfs::metadata::ObjectDescriptor;
use crate::gridfs::Bucket;
use crate::registry::ConnectionGroup;
use crate::resilience::{RetryBudget, RetryPolicy};

/// The receiving side went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sink closed")]
pub struct SinkClosed;

/// Receives an object's bytes in order.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write(&mut self, chunk: Bytes, is_last: bool) -> Result<(), SinkClosed>;
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Failed(#[from] GatewayError),

    #[error("client disconnected after {chunks} chunks")]
    ClientGone { chunks: u64 },
}

/// What was delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: u64,
    pub bytes: u64,
}

/// Stream every chunk of `descriptor` from `bucket` into `sink`.
pub async fn stream_object<S: ChunkSink + ?Sized>(
    policy: &RetryPolicy,
    group: &ConnectionGroup,
    budget: &mut RetryBudget,
    bucket: &Bucket,
    descriptor: &ObjectDescriptor,
    sink: &mut S,
) -> Result<StreamSummary, StreamError> {
    let mut summary = StreamSummary::default();

    if descriptor.chunk_count == 0 {
        sink.write(Bytes::new(), true)
            .await
            .map_err(|_| StreamError::ClientGone { chunks: 0 })?;
        return Ok(summary);
    }

    let chunks_collection = bucket.chunks_collection();
    let database = bucket.database.as_str();
    let collection = chunks_collection.as_str();
    let files_id = &descriptor.id;

    for n in 0..descriptor.chunk_count {
        let (_cursor, payload) = policy
            .execute(group, budget, |conn| async move {
                let mut cursor = conn.open_chunk(database, collection, files_id, n).await?;
                let payload = cursor.next_chunk().await?;
                Ok::<_, BackendError>((cursor, payload))
            })
            .await?;

        let payload = payload
            .ok_or_else(|| GatewayError::Corrupt(format!("chunk {n} of {files_id} is missing")))?;
        let expected = descriptor.expected_chunk_len(n);
        if payload.len() as u64 != expected {
            return Err(GatewayError::Corrupt(format!(
                "chunk {n} of {files_id} has {} bytes, expected {expected}",
                payload.len()
            ))
            .into());
        }

        let len = payload.len() as u64;
        let is_last = n + 1 == descriptor.chunk_count;
        sink.write(payload, is_last)
            .await
            .map_err(|_| StreamError::ClientGone {
                chunks: summary.chunks,
            })?;

        summary.chunks += 1;
        summary.bytes += len;
        tracing::trace!(chunk = n, bytes = len, is_last, "Chunk written");
    }

    Ok(summary)
}
