//! # distill-inference
//!
//! AI provider abstraction for the distillation pipeline.
//!
//! This crate provides:
//! - Provider configuration with static validation and a redacted credential
//! - Ollama adapter for the local model server
//! - OpenAI-compatible adapter (OpenAI, Azure OpenAI, Grok, Deepseek)
//! - Anthropic and Google Gemini adapters
//! - Uniform HTTP failure classification into [`ProviderError`]
//! - A versioned, atomically swappable [`ProviderRegistry`]
//!
//! # Example
//!
//! ```rust,no_run
//! use distill_inference::{ProviderConfig, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = ProviderRegistry::new(ProviderConfig::offline("llama3")).unwrap();
//!     let snapshot = registry.snapshot();
//!     let summary = snapshot
//!         .adapter
//!         .generate_summary("Some long article...", &Default::default())
//!         .await;
//!     println!("{:?}", summary);
//! }
//! ```

pub mod adapter;
pub mod anthropic;
pub mod config;
pub mod google;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod provider;

// Scripted provider for deterministic pipeline tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use distill_core::*;

pub use adapter::ProviderAdapter;
pub use anthropic::AnthropicAdapter;
pub use config::{ApiKey, ProviderConfig, ProviderKind, ProviderMode};
pub use google::GoogleAdapter;
pub use http::{build_prompt, truncate_to_budget};
pub use ollama::OllamaAdapter;
pub use openai::OpenAICompatAdapter;
pub use provider::{ProviderDescription, ProviderRegistry, ProviderSnapshot};
