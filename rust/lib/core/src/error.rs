use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────

/// Wire codes sent in the `code` field of every error body.
///
/// The HTTP backend client maps responses back to [`ServiceError`] by status,
/// so these exist for humans and scripts reading the JSON.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const FAILED_PRECONDITION: &str = "FAILED_PRECONDITION";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Error type shared by the store, the fulfillment service and the workflow.
///
/// Handlers return it directly; the response is a status plus a JSON body:
///
/// ```json
/// {"code": "CONFLICT", "message": "box 10004 already exists"}
/// ```
///
/// The fulfillment workflow uses the variants as its error taxonomy:
/// `Validation` for bad operator input, `Precondition` for a step attempted
/// before its inputs exist, `Conflict` for box-number collisions and
/// `Storage` for any remote/storage failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Resource does not exist. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// Key already taken by someone else. HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// Input data is invalid. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// A required earlier step has not happened yet. HTTP 412.
    #[error("{0}")]
    Precondition(String),

    /// Attempted write to read-only data. HTTP 403.
    #[error("{0}")]
    ReadOnly(String),

    /// Storage backend or transport failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::CONFLICT,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Precondition(_) => error_code::FAILED_PRECONDITION,
            ServiceError::ReadOnly(_) => error_code::READ_ONLY,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::ReadOnly(_) => StatusCode::FORBIDDEN,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same action unchanged.
    pub fn is_remote(&self) -> bool {
        matches!(self, ServiceError::Storage(_) | ServiceError::Internal(_))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
