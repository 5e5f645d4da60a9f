//! Error types for the mock server.

use hyper::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while compiling an expectation.
#[derive(Error, Debug)]
pub enum ExpectationError {
    #[error("invalid path pattern: {0}")]
    InvalidPathPattern(#[source] regex::Error),

    #[error("invalid request pattern: {0}")]
    InvalidRequestPattern(#[source] regex::Error),

    #[error("reading mock response file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by the expectation store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Expectation(#[from] ExpectationError),

    #[error("expectation not found: {0}")]
    NotFound(Uuid),

    #[error("failed to add expectation at index {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: ExpectationError,
    },
}

/// Errors surfaced by the HTTP API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("missing id parameter")]
    MissingId,

    #[error("expectation not found: {0}")]
    UnknownId(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedPayload(_) | ApiError::MissingId => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::UnknownId(_) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(StoreError::Expectation(e) | StoreError::Batch { source: e, .. }) => {
                match e {
                    ExpectationError::InvalidPathPattern(_)
                    | ExpectationError::InvalidRequestPattern(_) => StatusCode::BAD_REQUEST,
                    ExpectationError::FileRead { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        }
    }

    /// Short machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MalformedPayload(_) => "malformed_payload",
            ApiError::MethodNotAllowed => "method_not_allowed",
            ApiError::MissingId => "missing_id",
            ApiError::UnknownId(_) | ApiError::Store(StoreError::NotFound(_)) => "not_found",
            ApiError::Store(StoreError::Expectation(e) | StoreError::Batch { source: e, .. }) => {
                match e {
                    ExpectationError::InvalidPathPattern(_) => "invalid_path_pattern",
                    ExpectationError::InvalidRequestPattern(_) => "invalid_request_pattern",
                    ExpectationError::FileRead { .. } => "file_read_error",
                }
            }
        }
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
