//! OpenAI-compatible provider
//!
//! Works with any API that implements the OpenAI chat completions format:
//! - OpenAI (api.openai.com)
//! - Groq (api.groq.com)
//! - vLLM, LM Studio, LocalAI (local servers)
//!
//! The prompt is sent as a single user message; only the first choice is read.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionFailure, CompletionService, ProviderError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    pub default_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Whether requests without a key should be refused up front
    pub require_api_key: bool,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            require_api_key: true,
        }
    }
}

impl OpenAICompatConfig {
    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            default_model: model.into(),
            timeout_secs: 300, // Local inference can be slower
            require_api_key: false,
        }
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn api_key(&self) -> Result<Option<&str>, CompletionFailure> {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(Some(key)),
            _ if self.config.require_api_key => Err(CompletionFailure::Unauthorized(
                "API key is not configured".to_string(),
            )),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAICompatProvider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionFailure> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.config.base_url);

        let request = ChatCompletionRequest {
            model: self.config.default_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            max_tokens,
        };

        let mut req_builder = self.client.post(&url);
        if let Some(key) = api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = req_builder.json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(CompletionFailure::from_status(status, detail));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            CompletionFailure::Unavailable(format!("Failed to parse response: {}", e))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionFailure::Unavailable("No choices in response".to_string()))?;

        Ok(choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .unwrap_or_else(|| "No response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_preset_allows_missing_key() {
        let local = OpenAICompatConfig::local("http://localhost:8000/v1", "llama-3");
        assert!(!local.require_api_key);
        assert_eq!(local.default_model, "llama-3");

        let provider = OpenAICompatProvider::new(local).unwrap();
        assert_eq!(provider.api_key(), Ok(None));
    }

    #[test]
    fn test_empty_key_counts_as_missing() {
        let config = OpenAICompatConfig {
            api_key: Some(String::new()),
            ..OpenAICompatConfig::default()
        };
        let provider = OpenAICompatProvider::new(config).unwrap();
        assert!(matches!(
            provider.api_key(),
            Err(CompletionFailure::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_unauthorized_without_request() {
        let provider = OpenAICompatProvider::new(OpenAICompatConfig::default()).unwrap();
        let result = provider.complete("hello", 100, 0.7).await;
        assert!(matches!(result, Err(CompletionFailure::Unauthorized(_))));
    }
}
