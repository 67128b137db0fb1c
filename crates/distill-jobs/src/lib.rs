//! # distill-jobs
//!
//! Job processing pipeline for the distillation service.
//!
//! This crate provides:
//! - FIFO admission under a runtime-adjustable concurrency limit
//! - Per-job pipeline: extract, then summarize with retry and backoff
//! - Cooperative cancellation at stage boundaries and between retries
//! - Status projection and push notifications via broadcast channels
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use distill_inference::{ProviderConfig, ProviderRegistry};
//! use distill_jobs::{ExtractorRegistry, QueueBuilder, QueueConfig, SourceKind, TextFileExtractor};
//!
//! let providers = Arc::new(ProviderRegistry::new(ProviderConfig::from_env()?)?);
//!
//! let mut extractors = ExtractorRegistry::new();
//! extractors.register(Arc::new(TextFileExtractor::new()));
//!
//! let queue = QueueBuilder::new(providers)
//!     .with_config(QueueConfig::from_env())
//!     .with_extractors(extractors)
//!     .build();
//!
//! let id = queue.submit(SourceKind::File, "notes.txt").await?;
//! queue.wait_until_idle().await;
//! println!("{:?}", queue.report(id));
//! ```

pub mod adapters;
pub mod board;
pub mod extraction;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod store;

// Re-export core types
pub use distill_core::*;

pub use adapters::{HttpTextExtractor, TextFileExtractor};
pub use board::JobBoard;
pub use extraction::ExtractorRegistry;
pub use pipeline::JobPipeline;
pub use queue::{ProcessingQueue, QueueBuilder, QueueConfig, QueueEvent, StopOutcome};
pub use retry::{RetryDecision, RetryPolicy};
pub use store::MemoryJobStore;
