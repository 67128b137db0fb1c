//! Collaborator traits consumed by the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;
use crate::error::{ProviderError, Result};
use crate::models::{Job, SourceKind};

// =============================================================================
// EXTRACTION
// =============================================================================

/// Converts a source reference into raw text.
///
/// Each extractor handles one [`SourceKind`]. Extractors are registered in an
/// `ExtractorRegistry` and dispatched on the job's source kind. Implementations
/// must not retain partial state between calls.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// The source kind this extractor handles.
    fn source_kind(&self) -> SourceKind;

    /// Extract raw text from the referenced source.
    async fn extract(&self, source_ref: &str) -> Result<String>;

    /// Human-readable name of this extractor.
    fn name(&self) -> &str;
}

// =============================================================================
// STORAGE
// =============================================================================

/// Persistence for Job Records.
///
/// The pipeline calls `update` after every transition and log append. Writes
/// are best-effort from the pipeline's point of view.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &Job) -> Result<()>;

    async fn update(&self, job: &Job) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn list(&self) -> Result<Vec<Job>>;
}

// =============================================================================
// SUMMARY PROVIDERS
// =============================================================================

/// Generation parameters for one distillation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            max_tokens: defaults::SUMMARY_MAX_TOKENS,
            temperature: defaults::SUMMARY_TEMPERATURE,
            top_p: defaults::SUMMARY_TOP_P,
        }
    }
}

/// Outcome of a configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a diagnostic round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Uniform contract over one AI backend.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Produce a distillation of `text`.
    ///
    /// Implementations truncate `text` to [`max_input_length`](Self::max_input_length)
    /// before sending it.
    async fn generate_summary(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> std::result::Result<String, ProviderError>;

    /// Cheap, non-destructive check that this configuration is usable.
    async fn validate_configuration(&self) -> ValidationResult;

    /// Round trip a trivial prompt and measure latency.
    async fn test_connection(&self) -> ConnectionTest;

    /// Character budget for input text.
    fn max_input_length(&self) -> usize;

    /// Provider identity, e.g. `"ollama"` or `"openai"`.
    fn provider_id(&self) -> &str;

    /// The model requests are sent to.
    fn model_name(&self) -> &str;
}
