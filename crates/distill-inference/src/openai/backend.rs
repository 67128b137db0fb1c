//! OpenAI-compatible chat completions adapter.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use distill_core::{ProviderError, Result, SummaryOptions};

use super::error::classify;
use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::{ApiKey, ProviderConfig, ProviderKind};
use crate::http::{self, build_client};

/// Azure OpenAI REST API version used for deployment calls.
pub const AZURE_API_VERSION: &str = "2024-02-01";

/// URL and header conventions of the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// `{base}/chat/completions` with a bearer token.
    Standard,
    /// `{base}/openai/deployments/{model}/chat/completions` with an `api-key` header.
    Azure,
}

impl Flavor {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Microsoft => Self::Azure,
            _ => Self::Standard,
        }
    }
}

/// Adapter for OpenAI, Azure OpenAI, Grok and Deepseek.
pub struct OpenAICompatAdapter {
    client: Client,
    kind: ProviderKind,
    flavor: Flavor,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

impl OpenAICompatAdapter {
    /// Create an adapter from an already validated configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            kind: config.provider,
            flavor: Flavor::for_provider(config.provider),
            base_url: config.base_url()?,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_url(&self) -> String {
        match self.flavor {
            Flavor::Standard => format!("{}/chat/completions", self.base_url),
            Flavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, AZURE_API_VERSION
            ),
        }
    }

    fn build_request(&self, timeout: Duration) -> reqwest::RequestBuilder {
        let mut req = self.client.post(self.chat_url()).timeout(timeout);
        if let Some(key) = &self.api_key {
            req = match self.flavor {
                Flavor::Standard => req.bearer_auth(key.expose()),
                Flavor::Azure => req.header("api-key", key.expose()),
            };
        }
        req
    }

    /// Run one chat completion.
    pub async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &SummaryOptions,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        let name = self.kind.display_name();
        debug!(
            provider = self.kind.as_str(),
            model = %self.model,
            prompt_len = prompt.len(),
            "Sending chat completion"
        );

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let request = ChatCompletionRequest {
            model: match self.flavor {
                Flavor::Standard => Some(self.model.clone()),
                Flavor::Azure => None,
            },
            messages,
            temperature: Some(options.temperature),
            top_p: Some(options.top_p),
            max_tokens: Some(options.max_tokens),
            stream: false,
        };

        let response = match http::send(self.build_request(timeout).json(&request)).await? {
            Ok(response) => response,
            Err(failed) => return Err(classify(&failed, name)),
        };

        let body: ChatCompletionResponse = http::decode(response, name).await?;
        http::non_empty(body.into_content().unwrap_or_default(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_url() {
        let config = ProviderConfig::online(ProviderKind::Deepseek, "deepseek-chat", ApiKey::new("sk-1"));
        let adapter = OpenAICompatAdapter::new(&config).unwrap();
        assert_eq!(adapter.chat_url(), "https://api.deepseek.com/v1/chat/completions");
    }

    #[test]
    fn test_azure_url() {
        let config = ProviderConfig::online(ProviderKind::Microsoft, "gpt-4", ApiKey::new("k"))
            .with_endpoint("https://res.openai.azure.com/");
        let adapter = OpenAICompatAdapter::new(&config).unwrap();
        assert_eq!(
            adapter.chat_url(),
            format!(
                "https://res.openai.azure.com/openai/deployments/gpt-4/chat/completions?api-version={}",
                AZURE_API_VERSION
            )
        );
    }

    #[test]
    fn test_endpoint_override() {
        let config = ProviderConfig::online(ProviderKind::Grok, "grok-1", ApiKey::new("xai-1"))
            .with_endpoint("http://127.0.0.1:9999/v1");
        let adapter = OpenAICompatAdapter::new(&config).unwrap();
        assert_eq!(adapter.chat_url(), "http://127.0.0.1:9999/v1/chat/completions");
        assert_eq!(adapter.provider_kind(), ProviderKind::Grok);
        assert_eq!(adapter.model(), "grok-1");
    }
}
