//! OpenAI-style error handling.

use distill_core::ProviderError;

use crate::http::{classify_status, extract_error_type, FailedResponse};

/// Error codes carried in OpenAI-compatible error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Account has no remaining quota; waiting will not help.
    InsufficientQuota,
    /// Request too large for the model.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Anything else.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (_, "insufficient_quota") => Self::InsufficientQuota,
            (401, _) | (403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Classify a failed OpenAI-compatible response.
pub fn classify(failed: &FailedResponse, provider: &str) -> ProviderError {
    let error_type = extract_error_type(&failed.body).unwrap_or_default();
    let message = format!(
        "{} returned {}: {}",
        provider,
        failed.status,
        failed.message()
    );

    match OpenAIErrorCode::from_response(failed.status.as_u16(), &error_type) {
        OpenAIErrorCode::InsufficientQuota => ProviderError::Auth(message),
        OpenAIErrorCode::ContextLengthExceeded => ProviderError::BadRequest(message),
        _ => classify_status(failed.status, message, failed.retry_after),
    }
}
