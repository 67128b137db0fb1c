//! Error types for the distillation pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::models::{ErrorKind, JobStatus, SourceKind};

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// No extractor is registered for the source kind
    #[error("Unsupported source: no extractor registered for {0}")]
    UnsupportedSource(SourceKind),

    /// Extraction produced no usable text or the extractor failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Provider call failed (already classified)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A Job Record was asked to make a transition its state machine forbids
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The pending list is at capacity
    #[error("Queue full: {0} jobs already pending")]
    QueueFull(usize),

    /// Storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// User-facing category recorded on a failed Job Record.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedSource(_) => ErrorKind::UnsupportedSource,
            Error::Extraction(_) => ErrorKind::ExtractionFailed,
            Error::Provider(e) => e.kind(),
            _ => ErrorKind::Unknown,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

/// Failure surfaced by a provider adapter.
///
/// Every backend-specific failure is mapped into one of these four variants
/// before it leaves the adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Missing or rejected credential.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Backend throttling; `retry_after` carries the backend's hint when given.
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Payload rejected by the backend.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Network failure, timeout, or 5xx.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Build a rate-limit error without a retry hint.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        ProviderError::RateLimited {
            message: message.into(),
            retry_after: None,
        }
    }

    /// User-facing category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth(_) => ErrorKind::AuthError,
            ProviderError::RateLimited { .. } => ErrorKind::RateLimited,
            ProviderError::BadRequest(_) => ErrorKind::BadRequest,
            ProviderError::Unavailable(_) => ErrorKind::ProviderUnavailable,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Backend-provided minimum wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            ProviderError::Auth(m) | ProviderError::BadRequest(m) | ProviderError::Unavailable(m) => m,
            ProviderError::RateLimited { message, .. } => message,
        }
    }
}
