//! OpenAI-compatible provider adapter.
//!
//! One adapter serves every backend that speaks the chat completions
//! protocol:
//!
//! - OpenAI cloud API
//! - Azure OpenAI (Microsoft), addressed by deployment
//! - Grok (x.ai)
//! - Deepseek

mod backend;
mod error;
mod types;

pub use backend::{Flavor, OpenAICompatAdapter, AZURE_API_VERSION};
pub use error::{classify, OpenAIErrorCode};
pub use types::*;
