//! Completion providers
//!
//! Every backend implements [`CompletionService`]: one prompt in, one text
//! out, or a typed [`CompletionFailure`]. Providers never retry on their
//! own; wrap them in [`Retrying`] at the caller boundary instead.

mod ollama;
mod openai_compat;
mod retry;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::config::Config;

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};
pub use retry::{RetryPolicy, Retrying};

/// Why a completion could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionFailure {
    /// Missing or rejected credential. Fatal, never retried.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl CompletionFailure {
    /// Rate limits and outages may succeed on a later attempt; auth failures won't.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CompletionFailure::RateLimited(_) | CompletionFailure::Unavailable(_)
        )
    }

    /// The string handed back to callers in place of a real completion.
    pub fn degraded_response(&self) -> &'static str {
        match self {
            CompletionFailure::Unauthorized(_) => "Error: No API key",
            _ => "Error processing input",
        }
    }

    pub(crate) fn from_status(status: StatusCode, detail: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                CompletionFailure::Unauthorized(detail)
            }
            StatusCode::TOO_MANY_REQUESTS => CompletionFailure::RateLimited(detail),
            _ => CompletionFailure::Unavailable(format!("HTTP {}: {}", status, detail)),
        }
    }
}

/// A provider could not be built from configuration.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl From<reqwest::Error> for CompletionFailure {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => CompletionFailure::Unauthorized(err.to_string()),
            Some(429) => CompletionFailure::RateLimited(err.to_string()),
            _ => CompletionFailure::Unavailable(err.to_string()),
        }
    }
}

/// A text completion backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionFailure>;
}

pub enum Provider {
    OpenAI(OpenAICompatProvider),
    Ollama(OllamaProvider),
}

impl Provider {
    /// Build the backend named by `name`: "openai", "local" (an
    /// OpenAI-compatible server that needs no key) or "ollama".
    pub fn from_name(name: &str, config: &Config) -> Result<Self, ProviderError> {
        match name.to_lowercase().as_str() {
            "openai" => {
                let mut provider_config = OpenAICompatConfig::default();
                if let Some(ref base_url) = config.openai_base_url {
                    provider_config.base_url = base_url.clone();
                }
                provider_config.api_key = config.openai_api_key.clone();
                if let Some(ref model) = config.model {
                    provider_config.default_model = model.clone();
                }
                Ok(Provider::OpenAI(OpenAICompatProvider::new(provider_config)?))
            }
            "local" => {
                let base_url = config
                    .openai_base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:8000/v1".into());
                let model = config.model.clone().unwrap_or_else(|| "local-model".into());
                let mut provider_config = OpenAICompatConfig::local(base_url, model);
                provider_config.api_key = config.openai_api_key.clone();
                Ok(Provider::OpenAI(OpenAICompatProvider::new(provider_config)?))
            }
            "ollama" => {
                let url = config
                    .ollama_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".into());
                let model = config.model.clone().unwrap_or_else(|| "llama3.2".into());
                Ok(Provider::Ollama(OllamaProvider::new(url, model)))
            }
            _ => Err(ProviderError::UnknownProvider(name.to_string())),
        }
    }
}

#[async_trait]
impl CompletionService for Provider {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionFailure> {
        match self {
            Provider::OpenAI(p) => p.complete(prompt, max_tokens, temperature).await,
            Provider::Ollama(p) => p.complete(prompt, max_tokens, temperature).await,
        }
    }
}
