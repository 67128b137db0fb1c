//! Ollama adapter for the local model server.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use distill_core::{ProviderError, Result, SummaryOptions};

use crate::config::ProviderConfig;
use crate::http::{self, build_client};

const PROVIDER_NAME: &str = "Ollama";

/// Generations slower than this are logged as slow.
const SLOW_GENERATION_MS: u64 = 30_000;

/// Adapter for a local Ollama server.
pub struct OllamaAdapter {
    client: Client,
    base_url: String,
    model: String,
}

/// Chat API message for `/api/chat`.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Sampling options understood by Ollama.
#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Response from `/api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaAdapter {
    /// Create an adapter from an already validated configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: config.base_url()?,
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one chat request via `/api/chat`.
    pub async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &SummaryOptions,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        let start = Instant::now();
        debug!(model = %self.model, prompt_len = prompt.len(), "Starting generation via chat API");

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            options: ChatOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        let send = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(timeout)
            .json(&request);
        let response = match http::send(send).await? {
            Ok(response) => response,
            Err(failed) => return Err(failed.classify(PROVIDER_NAME)),
        };

        let result: ChatResponse = http::decode(response, PROVIDER_NAME).await?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = result.message.content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > SLOW_GENERATION_MS {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        http::non_empty(result.message.content, PROVIDER_NAME)
    }

    /// Check the server is reachable and has the configured model pulled.
    pub async fn ping(&self, timeout: Duration) -> std::result::Result<(), ProviderError> {
        let send = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(timeout);
        let response = match http::send(send).await? {
            Ok(response) => response,
            Err(failed) => return Err(failed.classify(PROVIDER_NAME)),
        };

        let tags: TagsResponse = http::decode(response, PROVIDER_NAME).await?;
        if tags.models.iter().any(|m| model_matches(&m.name, &self.model)) {
            Ok(())
        } else {
            Err(ProviderError::BadRequest(format!(
                "Model {} is not available on the Ollama server at {}",
                self.model, self.base_url
            )))
        }
    }
}

/// `llama3` matches a pulled `llama3:latest`.
fn model_matches(pulled: &str, wanted: &str) -> bool {
    pulled == wanted
        || (!wanted.contains(':') && pulled.strip_suffix(":latest") == Some(wanted))
}
