use axum::http::StatusCode;
use thiserror::Error;

/// Convenience type alias for Results with SpiralError
pub type Result<T> = std::result::Result<T, SpiralError>;

/// Main error type for Spiral Core
///
/// Every variant maps to exactly one entry in the JSON-RPC/HTTP error
/// taxonomy via [`SpiralError::wire_code`] and [`SpiralError::http_status`].
/// Implementations should prefer the most specific variant available;
/// `Internal` is reserved for genuinely unexpected failures.
#[derive(Error, Debug)]
pub enum SpiralError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid relation: {0}")]
    InvalidRelation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("deadline exceeded: {0}")]
    Deadline(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(#[from] reqwest::Error),
}

impl SpiralError {
    /// JSON-RPC error code, per the taxonomy in the system specification.
    pub fn wire_code(&self) -> i32 {
        match self {
            SpiralError::Unauthenticated(_) => -32001,
            SpiralError::PermissionDenied(_) => -32002,
            SpiralError::Validation(_) => -32602,
            SpiralError::NotFound(_) => -32004,
            SpiralError::AlreadyExists(_) => -32005,
            SpiralError::InvalidTransition(_) => -32010,
            SpiralError::InvalidRelation(_) => -32011,
            SpiralError::Conflict(_) => -32012,
            SpiralError::ResourceExhausted(_) => -32020,
            SpiralError::Deadline(_) => -32021,
            SpiralError::Unavailable(_) => -32030,
            SpiralError::Security(_) => -32040,
            SpiralError::ConfigurationError(_) => -32000,
            SpiralError::Internal(_) => -32000,
            SpiralError::Database(_) => -32030,
            SpiralError::Serialization(_) => -32602,
            SpiralError::Provider(_) => -32030,
        }
    }

    /// HTTP status code carrying the same classification as [`wire_code`].
    pub fn http_status(&self) -> StatusCode {
        match self {
            SpiralError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            SpiralError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            SpiralError::Validation(_) => StatusCode::BAD_REQUEST,
            SpiralError::NotFound(_) => StatusCode::NOT_FOUND,
            SpiralError::AlreadyExists(_) => StatusCode::CONFLICT,
            SpiralError::InvalidTransition(_) => StatusCode::CONFLICT,
            SpiralError::InvalidRelation(_) => StatusCode::CONFLICT,
            SpiralError::Conflict(_) => StatusCode::CONFLICT,
            SpiralError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            SpiralError::Deadline(_) => StatusCode::GATEWAY_TIMEOUT,
            SpiralError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SpiralError::Security(_) => StatusCode::FORBIDDEN,
            SpiralError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SpiralError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SpiralError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            SpiralError::Serialization(_) => StatusCode::BAD_REQUEST,
            SpiralError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Short machine-readable name used in JSON-RPC error data and audit rows.
    pub fn kind(&self) -> &'static str {
        match self {
            SpiralError::Unauthenticated(_) => "Unauthenticated",
            SpiralError::PermissionDenied(_) => "PermissionDenied",
            SpiralError::Validation(_) => "ValidationError",
            SpiralError::NotFound(_) => "NotFound",
            SpiralError::AlreadyExists(_) => "AlreadyExists",
            SpiralError::InvalidTransition(_) => "InvalidTransition",
            SpiralError::InvalidRelation(_) => "InvalidRelation",
            SpiralError::Conflict(_) => "Conflict",
            SpiralError::ResourceExhausted(_) => "ResourceExhausted",
            SpiralError::Deadline(_) => "Deadline",
            SpiralError::Unavailable(_) => "Unavailable",
            SpiralError::Security(_) => "SecurityError",
            SpiralError::ConfigurationError(_) => "Internal",
            SpiralError::Internal(_) => "Internal",
            SpiralError::Database(_) => "Unavailable",
            SpiralError::Serialization(_) => "ValidationError",
            SpiralError::Provider(_) => "Unavailable",
        }
    }
}
