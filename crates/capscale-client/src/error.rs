//! Error types for the HTTP collaborators.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use capscale_core::CapacityError;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("rate limited (retry after {retry_after}s)")]
    RateLimited { retry_after: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

impl From<ClientError> for CapacityError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidUrl { .. } | ClientError::Tls(_) => {
                CapacityError::Configuration(err.to_string())
            }
            other => CapacityError::TransientFetch(other.to_string()),
        }
    }
}
