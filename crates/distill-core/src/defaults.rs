//! Centralized default constants for the distillation pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// PROCESSING QUEUE
// =============================================================================

/// Concurrency limit applied at startup.
pub const QUEUE_CONCURRENCY: usize = 1;

/// Upper clamp for the runtime-adjustable concurrency limit.
pub const QUEUE_MAX_CONCURRENCY: usize = 10;

/// Maximum number of jobs waiting for admission before `submit` is refused.
pub const QUEUE_MAX_PENDING: usize = 1000;

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Timeout applied around a single extractor call in seconds.
pub const EXTRACT_TIMEOUT_SECS: u64 = 60;

/// Timeout for fetching a page over HTTP in seconds.
pub const HTTP_FETCH_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// RETRY
// =============================================================================

/// Maximum provider attempts (first call included) when rate limited.
pub const RETRY_RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;

/// Maximum provider attempts (first call included) when the provider is unavailable.
pub const RETRY_UNAVAILABLE_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry in milliseconds; doubles per attempt.
pub const RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Cap on the exponential backoff delay in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Ceiling on a backend's `Retry-After` hint, in seconds.
pub const RETRY_MAX_HINT_SECS: u64 = 300;

/// How often a backoff delay checks for a stop request, in milliseconds.
pub const STOP_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default local model server URL.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Request timeout for summary generation in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Timeout for the cheap configuration validation request in seconds.
pub const VALIDATE_TIMEOUT_SECS: u64 = 10;

/// Timeout for the diagnostic connection test in seconds.
pub const CONNECTION_TEST_TIMEOUT_SECS: u64 = 30;

/// Default `max_tokens` for a distillation.
pub const SUMMARY_MAX_TOKENS: u32 = 1000;

/// Default sampling temperature for a distillation.
pub const SUMMARY_TEMPERATURE: f32 = 0.7;

/// Default nucleus sampling for a distillation.
pub const SUMMARY_TOP_P: f32 = 1.0;

// =============================================================================
// INPUT BUDGETS (characters)
// =============================================================================

/// Local models: conservative, most run with small context windows.
pub const MAX_INPUT_OLLAMA: usize = 30_000;

/// OpenAI, Azure OpenAI and Grok chat models.
pub const MAX_INPUT_OPENAI: usize = 100_000;

/// Deepseek chat models (~15k tokens).
pub const MAX_INPUT_DEEPSEEK: usize = 60_000;

/// Anthropic Claude models.
pub const MAX_INPUT_ANTHROPIC: usize = 150_000;

/// Gemini models (~1M token window).
pub const MAX_INPUT_GOOGLE: usize = 800_000;
