//! Storage error types and error response formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Container errors
    ContainerNotFound,
    ContainerAlreadyExists,
    ContainerBeingDeleted,

    // Blob errors
    BlobNotFound,

    // Access policy errors
    TooManyPolicies,
    InvalidPolicyWindow,
    PolicyNotFound,
    PolicyExpired,
    PermissionDenied,
    AuthenticationFailed,

    // Listing errors
    InvalidContinuationToken,

    // General errors
    InvalidResourceName,
    InvalidMetadata,
    InvalidInput,
    OperationTimedOut,
    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerBeingDeleted => "ContainerBeingDeleted",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::TooManyPolicies => "TooManyPolicies",
            ErrorCode::InvalidPolicyWindow => "InvalidPolicyWindow",
            ErrorCode::PolicyNotFound => "PolicyNotFound",
            ErrorCode::PolicyExpired => "PolicyExpired",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ErrorCode::InvalidContinuationToken => "InvalidContinuationToken",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::InvalidMetadata => "InvalidMetadata",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::OperationTimedOut => "OperationTimedOut",
            ErrorCode::InternalError => "InternalError",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::TooManyPolicies
            | ErrorCode::InvalidPolicyWindow
            | ErrorCode::InvalidContinuationToken
            | ErrorCode::InvalidResourceName
            | ErrorCode::InvalidMetadata
            | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            ErrorCode::AuthenticationFailed => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            ErrorCode::PolicyNotFound | ErrorCode::PolicyExpired | ErrorCode::PermissionDenied => {
                StatusCode::FORBIDDEN
            }

            // 404 Not Found
            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            ErrorCode::ContainerAlreadyExists | ErrorCode::ContainerBeingDeleted => {
                StatusCode::CONFLICT
            }

            // 500 Internal Server Error
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            // 504 Gateway Timeout
            ErrorCode::OperationTimedOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ContainerNotFound => "The specified container does not exist.",
            ErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ErrorCode::ContainerBeingDeleted => "The specified container is being deleted.",
            ErrorCode::BlobNotFound => "The specified blob does not exist.",
            ErrorCode::TooManyPolicies => "A container may hold at most five access policies.",
            ErrorCode::InvalidPolicyWindow => "The policy expiry must be later than its start.",
            ErrorCode::PolicyNotFound => "The referenced access policy does not exist.",
            ErrorCode::PolicyExpired => "The access policy is not valid at this time.",
            ErrorCode::PermissionDenied => {
                "This request is not authorized to perform this operation."
            }
            ErrorCode::AuthenticationFailed => "Server failed to authenticate the request.",
            ErrorCode::InvalidContinuationToken => "The continuation token is invalid or stale.",
            ErrorCode::InvalidResourceName => {
                "The specified resource name contains invalid characters."
            }
            ErrorCode::InvalidMetadata => "The metadata specified is invalid.",
            ErrorCode::InvalidInput => "One of the request inputs is not valid.",
            ErrorCode::OperationTimedOut => "The operation could not be completed in time.",
            ErrorCode::InternalError => "The server encountered an internal error.",
        }
    }
}

/// Storage error with code and message.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct StorageError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl StorageError {
    /// Creates a new storage error with the given code and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            message: code.default_message().to_string(),
            code,
            request_id: None,
        }
    }

    /// Creates a new storage error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Wraps an I/O failure as an internal error, keeping the context.
    pub fn io(context: &str, err: std::io::Error) -> Self {
        Self::with_message(ErrorCode::InternalError, format!("{}: {}", context, err))
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Whether callers are expected to race against this error during
    /// concurrent cleanup and handle it at the call site.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ContainerBeingDeleted | ErrorCode::ContainerNotFound
        )
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let request_id = self
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let body = serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "requestId": request_id,
            "time": chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        });

        let mut response = (status, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = request_id.parse() {
            headers.insert("x-request-id", value);
        }
        headers.insert(
            "x-error-code",
            http::HeaderValue::from_static(self.code.as_str()),
        );
        response
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
