//! Response construction.
//!
//! # Responsibilities
//! - Map [`GatewayError`] to a status code and a short text body
//! - Build the object response head from an [`ObjectDescriptor`]
//! - Bridge the streaming engine to a response body
//!
//! # Design Decisions
//! - The body channel holds one frame, so the fetch loop runs at the
//!   client's pace
//! - A mid-stream failure is sent as a body error; the connection is
//!   aborted rather than ending a short body cleanly
//! - 5xx bodies carry only the canonical reason; details go to the log

use std::io;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use tokio::sync::mpsc;

use crate::error::GatewayError;
use crate::gridfs::{ChunkSink, ObjectDescriptor, SinkClosed};

type Frame = Result<Bytes, io::Error>;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            self.to_string()
        };
        (status, body).into_response()
    }
}

/// Writes chunks into a response body.
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
}

impl ChannelSink {
    /// A sink and the body that drains it.
    pub fn channel() -> (Self, Body) {
        let (tx, rx) = mpsc::channel::<Frame>(1);
        let frames = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        (Self { tx }, Body::from_stream(frames))
    }

    /// Fail the body so the client sees a truncated transfer.
    pub async fn abort(self, err: &GatewayError) {
        let _ = self.tx.send(Err(io::Error::other(err.to_string()))).await;
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes, _is_last: bool) -> Result<(), SinkClosed> {
        if chunk.is_empty() {
            return if self.tx.is_closed() { Err(SinkClosed) } else { Ok(()) };
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }
}

/// `200 OK` head for `descriptor` with the given body.
pub fn object_response(descriptor: &ObjectDescriptor, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let content_type = HeaderValue::from_str(descriptor.content_type())
        .unwrap_or_else(|_| HeaderValue::from_static(crate::gridfs::metadata::DEFAULT_CONTENT_TYPE));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(descriptor.length));
    if descriptor.gzipped {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }
    response
}
