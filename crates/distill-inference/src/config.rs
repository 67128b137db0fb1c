//! Provider configuration.
//!
//! One [`ProviderConfig`] is active at a time. It is replaced wholesale on
//! every update and validated before it becomes active.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use distill_core::{defaults, Error, Result};

/// Whether generation runs on the local model server or a cloud API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Offline,
    Online,
}

impl FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            other => Err(Error::Config(format!("Unknown provider mode: {}", other))),
        }
    }
}

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
    Microsoft,
    Grok,
    Deepseek,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 7] = [
        Self::Ollama,
        Self::OpenAi,
        Self::Anthropic,
        Self::Google,
        Self::Microsoft,
        Self::Grok,
        Self::Deepseek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::Grok => "grok",
            Self::Deepseek => "deepseek",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic Claude",
            Self::Google => "Google Gemini",
            Self::Microsoft => "Microsoft Copilot",
            Self::Grok => "Grok",
            Self::Deepseek => "Deepseek",
        }
    }

    /// Only the local model server runs offline.
    pub fn mode(&self) -> ProviderMode {
        match self {
            Self::Ollama => ProviderMode::Offline,
            _ => ProviderMode::Online,
        }
    }

    /// Base URL used when the configuration carries no endpoint override.
    ///
    /// Azure OpenAI endpoints are per-resource, so Microsoft has none.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some(defaults::OLLAMA_URL),
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com"),
            Self::Google => Some("https://generativelanguage.googleapis.com"),
            Self::Microsoft => None,
            Self::Grok => Some("https://api.x.ai/v1"),
            Self::Deepseek => Some("https://api.deepseek.com/v1"),
        }
    }

    pub fn default_model(&self) -> &'static str {
        self.known_models()[0]
    }

    /// Models offered for selection. The first entry is the default.
    pub fn known_models(&self) -> &'static [&'static str] {
        match self {
            Self::Ollama => &["llama3", "phi4-mini"],
            Self::OpenAi => &[
                "gpt-4o-mini",
                "gpt-4o",
                "gpt-4-turbo",
                "gpt-4",
                "gpt-3.5-turbo",
                "gpt-3.5-turbo-16k",
            ],
            Self::Anthropic => &[
                "claude-3-5-sonnet-20241022",
                "claude-3-haiku-20240307",
                "claude-3-sonnet-20240229",
                "claude-3-opus-20240229",
            ],
            Self::Google => &["gemini-2.5-flash"],
            Self::Microsoft => &["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo", "gpt-3.5-turbo-16k"],
            Self::Grok => &["grok-1.5", "grok-1"],
            Self::Deepseek => &["deepseek-chat", "deepseek-reasoner"],
        }
    }

    /// Required API key prefix, if the vendor uses one.
    pub fn key_prefix(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi | Self::Deepseek => Some("sk-"),
            Self::Anthropic => Some("sk-ant-"),
            Self::Grok => Some("xai-"),
            _ => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.mode() == ProviderMode::Online
    }

    /// Character budget for input text.
    pub fn max_input_length(&self) -> usize {
        match self {
            Self::Ollama => defaults::MAX_INPUT_OLLAMA,
            Self::OpenAi | Self::Microsoft | Self::Grok => defaults::MAX_INPUT_OPENAI,
            Self::Deepseek => defaults::MAX_INPUT_DEEPSEEK,
            Self::Anthropic => defaults::MAX_INPUT_ANTHROPIC,
            Self::Google => defaults::MAX_INPUT_GOOGLE,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| Error::Config(format!("Unknown provider: {}", wanted)))
    }
}

/// Opaque credential. Never printed and never serialized.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Active provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub mode: ProviderMode,
    pub provider: ProviderKind,
    pub model: String,
    /// Overrides the provider's default base URL.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<ApiKey>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    defaults::PROVIDER_TIMEOUT_SECS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::offline(ProviderKind::Ollama.default_model())
    }
}

impl ProviderConfig {
    /// Local model server configuration.
    pub fn offline(model: impl Into<String>) -> Self {
        Self {
            mode: ProviderMode::Offline,
            provider: ProviderKind::Ollama,
            model: model.into(),
            endpoint: None,
            api_key: None,
            timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
        }
    }

    /// Cloud provider configuration.
    pub fn online(provider: ProviderKind, model: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            mode: ProviderMode::Online,
            provider,
            model: model.into(),
            endpoint: None,
            api_key: Some(api_key),
            timeout_secs: defaults::PROVIDER_TIMEOUT_SECS,
        }
    }

    /// Set the endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base URL requests go to, without a trailing slash.
    pub fn base_url(&self) -> Result<String> {
        let url = match self.endpoint.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => e.to_string(),
            _ => self
                .provider
                .default_endpoint()
                .ok_or_else(|| {
                    Error::Config(format!(
                        "{} requires an endpoint",
                        self.provider.display_name()
                    ))
                })?
                .to_string(),
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    /// Static validation: no network access.
    pub fn validate(&self) -> Result<()> {
        let name = self.provider.display_name();

        if self.provider.mode() != self.mode {
            return Err(match self.mode {
                ProviderMode::Offline => {
                    Error::Config("Offline mode requires the local ollama provider".into())
                }
                ProviderMode::Online => {
                    Error::Config("Online mode requires a cloud provider".into())
                }
            });
        }

        if self.model.trim().is_empty() {
            return Err(Error::Config(format!("{} model name is required", name)));
        }

        if self.timeout_secs == 0 {
            return Err(Error::Config("Request timeout must be positive".into()));
        }

        let base_url = self.base_url()?;
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Endpoint must be http or https: {}",
                base_url
            )));
        }

        if self.provider.requires_api_key() {
            let key = self
                .api_key
                .as_ref()
                .map(|k| k.expose().trim())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| Error::Config(format!("{} API key is required", name)))?;

            if let Some(prefix) = self.provider.key_prefix() {
                if !key.starts_with(prefix) {
                    return Err(Error::Config(format!(
                        "Invalid {} API key format. API key should start with \"{}\"",
                        name, prefix
                    )));
                }
            }

            if self.provider == ProviderKind::Google && key.len() < 30 {
                return Err(Error::Config(format!("Invalid {} API key format", name)));
            }
        }

        Ok(())
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISTILL_MODE` | inferred from provider, else `offline` | `offline` or `online` |
    /// | `DISTILL_PROVIDER` | `ollama` offline, `openai` online | Provider identity |
    /// | `DISTILL_MODEL` | provider default | Model name |
    /// | `DISTILL_ENDPOINT` | provider default | Base URL override |
    /// | `DISTILL_API_KEY` | (none) | Credential for cloud providers |
    /// | `DISTILL_TIMEOUT_SECS` | `60` | Request timeout |
    pub fn from_env() -> Result<Self> {
        let provider = std::env::var("DISTILL_PROVIDER")
            .ok()
            .map(|v| v.parse::<ProviderKind>())
            .transpose()?;
        let mode = std::env::var("DISTILL_MODE")
            .ok()
            .map(|v| v.parse::<ProviderMode>())
            .transpose()?;

        let (mode, provider) = match (mode, provider) {
            (Some(m), Some(p)) => (m, p),
            (None, Some(p)) => (p.mode(), p),
            (Some(ProviderMode::Online), None) => (ProviderMode::Online, ProviderKind::OpenAi),
            (Some(ProviderMode::Offline), None) | (None, None) => {
                (ProviderMode::Offline, ProviderKind::Ollama)
            }
        };

        let model = std::env::var("DISTILL_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| provider.default_model().to_string());

        let timeout_secs = match std::env::var("DISTILL_TIMEOUT_SECS") {
            Ok(v) => v
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("Invalid DISTILL_TIMEOUT_SECS: {}", v)))?,
            Err(_) => defaults::PROVIDER_TIMEOUT_SECS,
        };

        Ok(Self {
            mode,
            provider,
            model,
            endpoint: std::env::var("DISTILL_ENDPOINT")
                .ok()
                .filter(|e| !e.trim().is_empty()),
            api_key: std::env::var("DISTILL_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(ApiKey::new),
            timeout_secs,
        })
    }
}
