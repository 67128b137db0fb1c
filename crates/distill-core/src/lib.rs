//! # distill-core
//!
//! Core types, traits, and abstractions for the distillation pipeline.
//!
//! This crate provides the Job Record and its state machine, the error
//! taxonomy shared by every stage, and the collaborator traits (extractors,
//! storage, summary providers) that the other crates implement or consume.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, ProviderError, Result};
pub use models::*;
pub use traits::*;
