use reqwest::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum BoxError {
    #[error("not found: {body}")]
    NotFound { body: String },
    #[error("entity {id} was deleted or detached")]
    StaleEntity { id: String },
    #[error("name conflict: {body}")]
    NameConflict { body: String },
    #[error("authorization failed with {status}: {body}")]
    Auth { status: StatusCode, body: String },
    #[error("api returned {status}: {body}")]
    Remote { status: StatusCode, body: String },
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api response missing `{0}`")]
    MissingField(&'static str),
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

impl BoxError {
    /// Maps a non-success status and its body onto the error taxonomy.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => BoxError::NotFound { body },
            StatusCode::CONFLICT => BoxError::NameConflict { body },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BoxError::Auth { status, body },
            _ => BoxError::Remote { status, body },
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BoxError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            BoxError::NameConflict { .. } => Some(StatusCode::CONFLICT),
            BoxError::Auth { status, .. } | BoxError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        self.status().map(classify_api_status)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}
