//! Error kinds surfaced by the cloud API and by reconciliation.

use std::time::Duration;

pub const HTTP_NOT_FOUND: u16 = 404;

/// Failure of a single cloud API call.
///
/// A missing object is reported through the response status carried by
/// `Status`, never through a dedicated variant; check [`ApiError::is_not_found`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status { status, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self { Self::status(HTTP_NOT_FOUND, message) }

    /// HTTP-style status of the response, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool { self.status_code() == Some(HTTP_NOT_FOUND) }
}

/// Errors returned by reconciliation entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CcmError {
    #[error("cloud api: {0}")]
    Remote(#[from] ApiError),
    #[error("the {annotation:?} service annotation refers to nonexistent certificate {id:?}")]
    DanglingReference { annotation: &'static str, id: String },
    #[error("tag {tag:?} does not exist")]
    TagMissing { tag: String },
    #[error("load balancer {id} did not become active within {timeout:?}")]
    ConvergenceTimeout { id: String, timeout: Duration },
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
    #[error("orchestrator: {0}")]
    Orchestrator(String),
    #[error("validation: {0}")]
    Validation(String),
}

pub type CcmResult<T> = Result<T, CcmError>;
