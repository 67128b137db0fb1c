//! Anthropic Messages API adapter.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use distill_core::{ProviderError, Result, SummaryOptions};

use crate::config::{ApiKey, ProviderConfig};
use crate::http::{self, build_client};

/// Value sent in the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const PROVIDER_NAME: &str = "Anthropic";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks.
    fn text(self) -> String {
        self.content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Adapter for Claude models.
pub struct AnthropicAdapter {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

impl AnthropicAdapter {
    /// Create an adapter from an already validated configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: config.base_url()?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one request against `/v1/messages`.
    pub async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &SummaryOptions,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending messages request");

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            system: system.filter(|s| !s.is_empty()),
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut send = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .timeout(timeout)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request);
        if let Some(key) = &self.api_key {
            send = send.header("x-api-key", key.expose());
        }

        let response = match http::send(send).await? {
            Ok(response) => response,
            Err(failed) => {
                // 529 is Anthropic's "overloaded"
                return Err(failed.classify(PROVIDER_NAME));
            }
        };

        let body: MessagesResponse = http::decode(response, PROVIDER_NAME).await?;
        http::non_empty(body.text(), PROVIDER_NAME)
    }
}
