//! Shared HTTP plumbing for the provider adapters.
//!
//! Every adapter maps its failures through [`classify_status`] or
//! [`classify_transport`] so the pipeline only ever sees a [`ProviderError`].

use std::borrow::Cow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

use distill_core::{defaults, Error, ProviderError, Result};

/// System instruction sent with every distillation request.
pub const DISTILL_SYSTEM_PROMPT: &str = "You are an expert at distilling long documents. \
Produce a clear, well-structured summary that keeps the key ideas, facts and conclusions \
of the source. Use short paragraphs or bullet points. Do not invent information.";

/// Build a reqwest client shared by one adapter.
///
/// Timeouts are applied per request so one client serves generation,
/// validation and connection tests.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Wrap source text in the distillation instruction.
pub fn build_prompt(text: &str) -> String {
    format!(
        "Distill the following content into a concise summary.\n\n---\n{}\n---",
        text
    )
}

/// Truncate `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_to_budget(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(text[..byte_idx].to_string()),
        None => Cow::Borrowed(text),
    }
}

/// Map an HTTP status to a provider failure.
pub fn classify_status(
    status: StatusCode,
    message: impl Into<String>,
    retry_after: Option<Duration>,
) -> ProviderError {
    let message = message.into();
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited {
            message,
            retry_after,
        },
        408 => ProviderError::Unavailable(message),
        400..=499 => ProviderError::BadRequest(message),
        _ => ProviderError::Unavailable(message),
    }
}

/// Map a transport-level failure (no usable HTTP status) to a provider failure.
pub fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unavailable(format!("Request timed out: {}", err))
    } else if err.is_connect() {
        ProviderError::Unavailable(format!("Connection failed: {}", err))
    } else if err.is_builder() {
        ProviderError::BadRequest(format!("Invalid request: {}", err))
    } else if let Some(status) = err.status() {
        classify_status(status, err.to_string(), None)
    } else {
        ProviderError::Unavailable(format!("Request failed: {}", err))
    }
}

/// Read the backend's retry hint from response headers.
///
/// Understands `retry-after-ms`, `retry-after` in seconds and
/// `retry-after` as an HTTP date. Hints are capped at
/// [`defaults::RETRY_MAX_HINT_SECS`].
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    if let Some(ms) = headers
        .get("retry-after-ms")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
    {
        return seconds_to_hint(ms / 1000.0);
    }

    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return seconds_to_hint(secs);
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let wait = at.signed_duration_since(Utc::now());
    Some(wait.to_std().unwrap_or(Duration::ZERO).min(max_hint()))
}

fn max_hint() -> Duration {
    Duration::from_secs(defaults::RETRY_MAX_HINT_SECS)
}

/// Negative and NaN values are not hints; overflowing ones hit the ceiling.
fn seconds_to_hint(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Some(
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::MAX)
            .min(max_hint()),
    )
}

/// Pull a human-readable message out of an error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}`; falls back to the raw body.
pub fn extract_error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let found = json
            .pointer("/error/message")
            .or_else(|| json.get("error").filter(|e| e.is_string()))
            .or_else(|| json.get("message"))
            .and_then(Value::as_str);
        if let Some(message) = found {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        truncate_to_budget(trimmed, 500).into_owned()
    }
}

/// Error `code`, `type` or `status` field from an error body, first string wins.
pub fn extract_error_type(body: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    ["/error/code", "/error/type", "/error/status"]
        .iter()
        .find_map(|p| json.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
}

/// Status, retry hint and body of a non-success response.
#[derive(Debug, Clone)]
pub struct FailedResponse {
    pub status: StatusCode,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl FailedResponse {
    /// Consume a non-success response.
    pub async fn read(response: Response) -> Self {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Self {
            status,
            retry_after,
            body,
        }
    }

    pub fn message(&self) -> String {
        extract_error_message(&self.body)
    }

    /// Default classification, prefixed with the provider's display name.
    pub fn classify(&self, provider: &str) -> ProviderError {
        let message = format!("{} returned {}: {}", provider, self.status, self.message());
        classify_status(self.status, message, self.retry_after)
    }
}

/// Send a request and split the outcome into a success response or a
/// classified failure.
pub async fn send(
    request: reqwest::RequestBuilder,
) -> std::result::Result<std::result::Result<Response, FailedResponse>, ProviderError> {
    let response = request.send().await.map_err(|e| classify_transport(&e))?;
    if response.status().is_success() {
        Ok(Ok(response))
    } else {
        Ok(Err(FailedResponse::read(response).await))
    }
}

/// Decode a success body, treating malformed payloads as unavailability.
pub async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
    provider: &str,
) -> std::result::Result<T, ProviderError> {
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            classify_transport(&e)
        } else {
            ProviderError::Unavailable(format!("{} returned an unreadable response: {}", provider, e))
        }
    })
}

/// Reject an empty completion.
pub fn non_empty(content: String, provider: &str) -> std::result::Result<String, ProviderError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(ProviderError::Unavailable(format!(
            "{} returned an empty response",
            provider
        )))
    } else {
        Ok(trimmed.to_string())
    }
}
