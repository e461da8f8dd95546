//! Error types
//!
//! Every fallible library call returns [`DclError`]. The reconciler relies on
//! the classification helpers ([`DclError::is_not_found`],
//! [`DclError::is_conflict`], [`DclError::is_retryable`]) to decide between
//! creating, retrying and failing.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while reading or reconciling resources
#[derive(Error, Debug)]
pub enum DclError {
    /// Non-success HTTP response from a GCP API
    #[error("API request failed: {status} {message}")]
    Api { status: u16, message: String },

    /// The resource (or its parent) does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The user-specified state is invalid for its schema
    #[error("invalid resource: {0}")]
    Validation(String),

    /// The requested changes cannot be applied under the current lifecycle directives
    #[error("apply infeasible: {0}")]
    ApplyInfeasible(String),

    /// Actuation finished but the resource still differs from the desired state
    #[error("diffs remain after apply: {}", diffs.join("; "))]
    DiffAfterApply {
        diffs: Vec<String>,
        new_state: Box<crate::resource::Resource>,
    },

    /// A long-running operation finished with an error
    #[error("operation {name} failed: {message}")]
    OperationFailed { name: String, message: String },

    /// A delete succeeded but the resource is still readable
    #[error("resource {0} still exists after delete")]
    NotDeleted(String),

    /// Several independent calls failed (delete-all keeps going past failures)
    #[error("{}", .0.join("\n"))]
    Multiple(Vec<String>),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Resource schema is missing or inconsistent
    #[error("schema error: {0}")]
    Schema(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, DclError>;

impl DclError {
    /// Build an API error from a status code and a (sanitized) message
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == StatusCode::NOT_FOUND {
            return Self::NotFound(message);
        }
        Self::Api {
            status: status.as_u16(),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// 409: someone else changed the resource, re-plan from fresh state
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }

    /// Transient failures worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// HTTP status associated with this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
