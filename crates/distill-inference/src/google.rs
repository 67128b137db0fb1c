//! Google Gemini `generateContent` adapter.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use distill_core::{ProviderError, Result, SummaryOptions};

use crate::config::{ApiKey, ProviderConfig};
use crate::http::{self, build_client, FailedResponse};

const PROVIDER_NAME: &str = "Google Gemini";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let parts = self.candidates.into_iter().next()?.content?.parts;
        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

/// Gemini reports a rejected key as a 400 whose message names the key.
fn classify(failed: &FailedResponse) -> ProviderError {
    if failed.status == StatusCode::BAD_REQUEST && failed.message().contains("API key") {
        return ProviderError::Auth(format!(
            "{} rejected the API key: {}",
            PROVIDER_NAME,
            failed.message()
        ));
    }
    failed.classify(PROVIDER_NAME)
}

/// Adapter for Gemini models.
pub struct GoogleAdapter {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<ApiKey>,
}

impl GoogleAdapter {
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

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// Run one `generateContent` request.
    pub async fn chat(
        &self,
        system: Option<&str>,
        prompt: &str,
        options: &SummaryOptions,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generateContent request");

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system.filter(|s| !s.is_empty()).map(|s| Content {
                parts: vec![Part { text: s }],
            }),
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_p: options.top_p,
                max_output_tokens: options.max_tokens,
            },
        };

        let mut send = self
            .client
            .post(self.generate_url())
            .timeout(timeout)
            .json(&request);
        if let Some(key) = &self.api_key {
            send = send.header("x-goog-api-key", key.expose());
        }

        let response = match http::send(send).await? {
            Ok(response) => response,
            Err(failed) => return Err(classify(&failed)),
        };

        let body: GenerateResponse = http::decode(response, PROVIDER_NAME).await?;
        match body.text() {
            Some(text) => http::non_empty(text, PROVIDER_NAME),
            None => Err(ProviderError::Unavailable(format!(
                "Invalid response format from {}",
                PROVIDER_NAME
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn failed(status: u16, body: &str) -> FailedResponse {
        FailedResponse {
            status: StatusCode::from_u16(status).unwrap(),
            retry_after: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_generate_url() {
        let config = ProviderConfig::online(
            ProviderKind::Google,
            "gemini-2.5-flash",
            ApiKey::new("A".repeat(39)),
        );
        let adapter = GoogleAdapter::new(&config).unwrap();
        assert_eq!(
            adapter.generate_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "Hello" }],
            }],
            system_instruction: None,
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 1.0,
                max_output_tokens: 10,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 10);
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn test_response_text() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"A "},{"text":"B"}],"role":"model"}}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text().as_deref(), Some("A B"));

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn test_bad_key_is_auth() {
        let err = classify(&failed(
            400,
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#,
        ));
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn test_other_400_is_bad_request() {
        let err = classify(&failed(400, r#"{"error":{"message":"Invalid JSON payload"}}"#));
        assert!(matches!(err, ProviderError::BadRequest(_)));
    }

    #[test]
    fn test_forbidden_and_quota() {
        assert!(matches!(classify(&failed(403, "{}")), ProviderError::Auth(_)));
        assert!(matches!(
            classify(&failed(429, "{}")),
            ProviderError::RateLimited { .. }
        ));
    }
}
