//! Request-level error taxonomy.
//!
//! Every failure a request can hit is classified into a [`GatewayError`]
//! before it reaches the HTTP boundary, where it maps to one status code.

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::BackendError;
use crate::gridfs::key::MalformedKeyError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no location serves '{0}'")]
    NoLocation(String),

    #[error("malformed key: {0}")]
    MalformedKey(#[from] MalformedKeyError),

    #[error("object not found")]
    NotFound,

    /// Retry budget exhausted, or reconnect/reauthenticate failed.
    #[error("connection group '{group}' unavailable: {source}")]
    Unavailable {
        group: String,
        #[source]
        source: BackendError,
    },

    /// Non-transient backend failure.
    #[error("backend error: {0}")]
    Backend(BackendError),

    /// Stored object does not match its metadata.
    #[error("corrupt object: {0}")]
    Corrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::NoLocation(_) | GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::MalformedKey(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend(_) | GatewayError::Corrupt(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Malformed(reason) => GatewayError::Corrupt(reason),
            other => GatewayError::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::MalformedKey(MalformedKeyError::Empty).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Unavailable {
                group: "main".into(),
                source: BackendError::Transient("reset".into()),
            }
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::from(BackendError::Malformed("no data".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
