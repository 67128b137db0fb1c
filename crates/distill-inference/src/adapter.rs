//! Dispatch from a [`ProviderConfig`] to the backend adapter that serves it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use distill_core::{
    defaults, ConnectionTest, ProviderError, Result, SummaryOptions, SummaryProvider,
    ValidationResult,
};

use crate::anthropic::AnthropicAdapter;
use crate::config::{ProviderConfig, ProviderKind};
use crate::google::GoogleAdapter;
use crate::http::{build_prompt, truncate_to_budget, DISTILL_SYSTEM_PROMPT};
use crate::ollama::OllamaAdapter;
use crate::openai::OpenAICompatAdapter;

const CONNECTION_TEST_PROMPT: &str = "Reply with the words: connection successful";

enum Backend {
    Ollama(OllamaAdapter),
    OpenAi(OpenAICompatAdapter),
    Anthropic(AnthropicAdapter),
    Google(GoogleAdapter),
}

/// A [`SummaryProvider`] built from one configuration.
pub struct ProviderAdapter {
    timeout: Duration,
    backend: Backend,
}

impl ProviderAdapter {
    /// Validate `config` statically and build the matching adapter.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let backend = match config.provider {
            ProviderKind::Ollama => Backend::Ollama(OllamaAdapter::new(config)?),
            ProviderKind::OpenAi
            | ProviderKind::Microsoft
            | ProviderKind::Grok
            | ProviderKind::Deepseek => Backend::OpenAi(OpenAICompatAdapter::new(config)?),
            ProviderKind::Anthropic => Backend::Anthropic(AnthropicAdapter::new(config)?),
            ProviderKind::Google => Backend::Google(GoogleAdapter::new(config)?),
        };

        Ok(Self {
            timeout: config.timeout(),
            backend,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        match &self.backend {
            Backend::Ollama(_) => ProviderKind::Ollama,
            Backend::OpenAi(a) => a.provider_kind(),
            Backend::Anthropic(_) => ProviderKind::Anthropic,
            Backend::Google(_) => ProviderKind::Google,
        }
    }

    fn model(&self) -> &str {
        match &self.backend {
            Backend::Ollama(a) => a.model(),
            Backend::OpenAi(a) => a.model(),
            Backend::Anthropic(a) => a.model(),
            Backend::Google(a) => a.model(),
        }
    }

    async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &SummaryOptions,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        match &self.backend {
            Backend::Ollama(a) => a.chat(system, prompt, options, timeout).await,
            Backend::OpenAi(a) => a.chat(system, prompt, options, timeout).await,
            Backend::Anthropic(a) => a.chat(system, prompt, options, timeout).await,
            Backend::Google(a) => a.chat(system, prompt, options, timeout).await,
        }
    }

    /// Cheap remote check.
    ///
    /// Ollama lists pulled models; cloud providers get a tiny completion.
    async fn ping(&self) -> std::result::Result<(), ProviderError> {
        let timeout = Duration::from_secs(defaults::VALIDATE_TIMEOUT_SECS);
        match &self.backend {
            Backend::Ollama(a) => a.ping(timeout).await,
            _ => {
                let options = SummaryOptions {
                    max_tokens: 10,
                    ..SummaryOptions::default()
                };
                self.chat(None, "Hello", &options, timeout).await.map(|_| ())
            }
        }
    }
}

#[async_trait]
impl SummaryProvider for ProviderAdapter {
    async fn generate_summary(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> std::result::Result<String, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::BadRequest("No text to summarize".to_string()));
        }

        let budget = self.max_input_length();
        let input = truncate_to_budget(text, budget);
        if input.len() < text.len() {
            debug!(
                provider = self.kind().as_str(),
                max_chars = budget,
                "Input truncated to provider budget"
            );
        }

        let prompt = build_prompt(&input);
        let start = Instant::now();
        let result = self
            .chat(Some(DISTILL_SYSTEM_PROMPT), &prompt, options, self.timeout)
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(summary) => info!(
                provider = self.kind().as_str(),
                model = %self.model(),
                duration_ms,
                summary_len = summary.len(),
                "Summary generated"
            ),
            Err(e) => warn!(
                provider = self.kind().as_str(),
                model = %self.model(),
                duration_ms,
                error_kind = %e.kind(),
                error = %e,
                "Summary generation failed"
            ),
        }
        result
    }

    async fn validate_configuration(&self) -> ValidationResult {
        match self.ping().await {
            Ok(()) => ValidationResult::ok(),
            Err(e) => {
                warn!(provider = self.kind().as_str(), error = %e, "Provider validation failed");
                ValidationResult::invalid(e.to_string())
            }
        }
    }

    async fn test_connection(&self) -> ConnectionTest {
        let options = SummaryOptions {
            max_tokens: 20,
            ..SummaryOptions::default()
        };
        let timeout = Duration::from_secs(defaults::CONNECTION_TEST_TIMEOUT_SECS);
        let start = Instant::now();
        let result = self
            .chat(None, CONNECTION_TEST_PROMPT, &options, timeout)
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => ConnectionTest {
                success: true,
                latency_ms,
                response: Some(response),
                error: None,
            },
            Err(e) => ConnectionTest {
                success: false,
                latency_ms,
                response: None,
                error: Some(e.to_string()),
            },
        }
    }

    fn max_input_length(&self) -> usize {
        self.kind().max_input_length()
    }

    fn provider_id(&self) -> &str {
        self.kind().as_str()
    }

    fn model_name(&self) -> &str {
        self.model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;

    #[test]
    fn test_from_config_rejects_invalid() {
        let config = ProviderConfig::online(ProviderKind::OpenAi, "gpt-4o", ApiKey::new("bad"));
        assert!(ProviderAdapter::from_config(&config).is_err());
    }

    #[test]
    fn test_from_config_dispatch() {
        let cases = [
            (ProviderConfig::offline("llama3"), "ollama"),
            (
                ProviderConfig::online(ProviderKind::Deepseek, "deepseek-chat", ApiKey::new("sk-1")),
                "deepseek",
            ),
            (
                ProviderConfig::online(ProviderKind::Grok, "grok-1", ApiKey::new("xai-1")),
                "grok",
            ),
        ];
        for (config, id) in cases {
            let adapter = ProviderAdapter::from_config(&config).unwrap();
            assert_eq!(adapter.provider_id(), id);
            assert_eq!(adapter.model_name(), config.model);
            assert_eq!(adapter.max_input_length(), config.provider.max_input_length());
        }
    }

    #[tokio::test]
    async fn test_empty_text_is_bad_request() {
        let adapter = ProviderAdapter::from_config(&ProviderConfig::offline("llama3")).unwrap();
        let err = adapter
            .generate_summary("   ", &SummaryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::BadRequest(_)));
    }
}
