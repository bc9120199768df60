//! Completion providers.
//!
//! Supports OpenAI and Anthropic APIs. A provider makes exactly one HTTP call
//! per request; retry, backoff and tier fallback live in the gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shipwright_core::{GenerationConfig, ProviderKind};

use crate::error::{LlmError, LlmResult};

const OPENAI_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Response from a provider including usage info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
}

/// A text completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse>;
}

/// HTTP client for the OpenAI or Anthropic API.
pub struct HttpCompletionService {
    provider: ProviderKind,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpCompletionService {
    pub fn new(
        provider: ProviderKind,
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> LlmResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("HTTP client: {}", e)))?;
        let base_url = base_url.unwrap_or_else(|| match provider {
            ProviderKind::OpenAi => OPENAI_URL.to_string(),
            ProviderKind::Anthropic => ANTHROPIC_URL.to_string(),
        });
        Ok(Self {
            provider,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create from configuration, reading the API key from the environment.
    pub fn from_config(config: &GenerationConfig) -> LlmResult<Self> {
        let var = match config.provider {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| LlmError::NotConfigured(format!("set {}", var)))?;
        Self::new(
            config.provider,
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAIRequest {
            model: request.model.clone(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            max_completion_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No response from OpenAI".to_string()))?;

        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            model: request.model.clone(),
        })
    }

    async fn complete_anthropic(
        &self,
        request: &CompletionRequest,
    ) -> LlmResult<CompletionResponse> {
        let url = format!("{}/messages", self.base_url);
        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: Some(request.system.clone()).filter(|s| !s.is_empty()),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: request.user.clone(),
            }],
            temperature: Some(request.temperature),
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        let result: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content: String = result
            .content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        if content.is_empty() {
            return Err(LlmError::InvalidResponse(
                "No response from Anthropic".to_string(),
            ));
        }

        let (input_tokens, output_tokens) = result
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
            model: request.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    fn name(&self) -> &str {
        match self.provider {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> LlmResult<CompletionResponse> {
        debug!(provider = self.name(), model = %request.model, "Sending completion request");
        match self.provider {
            ProviderKind::OpenAi => self.complete_openai(request).await,
            ProviderKind::Anthropic => self.complete_anthropic(request).await,
        }
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

// Anthropic API types
#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_base_urls() {
        let openai = HttpCompletionService::new(
            ProviderKind::OpenAi,
            "key",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(openai.base_url, OPENAI_URL);
        assert_eq!(openai.name(), "openai");

        let anthropic = HttpCompletionService::new(
            ProviderKind::Anthropic,
            "key",
            Some("http://localhost:9000/v1/".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(anthropic.base_url, "http://localhost:9000/v1");
        assert_eq!(anthropic.provider(), ProviderKind::Anthropic);
    }

    #[test]
    fn test_response_shapes() {
        let openai: OpenAIResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"hi"}}],"usage":{"prompt_tokens":3,"completion_tokens":1}}"#,
        )
        .unwrap();
        assert_eq!(openai.choices[0].message.content.as_deref(), Some("hi"));

        let anthropic: AnthropicResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"hello"}],"usage":{"input_tokens":5,"output_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(anthropic.content[0].text.as_deref(), Some("hello"));
    }
}
