//! Application configuration

pub mod agent;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub use agent::{AgentConfig, ConfigError};

use crate::core::{CompletionSettings, ConsolidationPolicy};
use crate::providers::RetryPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// "openai", "local" (OpenAI-compatible, key optional) or "ollama"
    pub provider: String,
    pub model: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub ollama_url: Option<String>,
    pub completion: CompletionSettings,
    pub policy: ConsolidationPolicy,
    pub retry: RetryPolicy,
    /// Optional TOML agent file layered on top of the environment
    pub agent_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            data_dir: PathBuf::from("./data"),
            provider: "openai".into(),
            model: None,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: None,
            completion: CompletionSettings::default(),
            policy: ConsolidationPolicy::default(),
            retry: RetryPolicy::default(),
            agent_file: None,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            data_dir: env::var("MEMLOOP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            provider: env::var("MEMLOOP_PROVIDER").unwrap_or(defaults.provider),
            model: env::var("MEMLOOP_MODEL").ok(),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            ollama_url: env::var("OLLAMA_URL").ok(),
            completion: CompletionSettings {
                max_tokens: parsed("MEMLOOP_MAX_TOKENS").unwrap_or(defaults.completion.max_tokens),
                temperature: parsed("MEMLOOP_TEMPERATURE")
                    .unwrap_or(defaults.completion.temperature),
            },
            policy: ConsolidationPolicy {
                size_threshold: parsed("MEMLOOP_SIZE_THRESHOLD")
                    .unwrap_or(defaults.policy.size_threshold),
                time_threshold_minutes: parsed("MEMLOOP_TIME_THRESHOLD_MINUTES")
                    .unwrap_or(defaults.policy.time_threshold_minutes),
            },
            retry: RetryPolicy {
                attempts: parsed("MEMLOOP_RETRY_ATTEMPTS").unwrap_or(defaults.retry.attempts),
                base_delay: parsed("MEMLOOP_RETRY_BASE_DELAY_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry.base_delay),
            },
            agent_file: env::var("MEMLOOP_CONFIG").ok().map(PathBuf::from),
        };

        if let Some(path) = config.agent_file.clone() {
            let agent = AgentConfig::from_file(&path)?;
            tracing::info!("Loaded agent config from {}", path.display());
            config.apply(agent);
        }

        Ok(config)
    }

    /// Override with every value the agent file sets.
    pub fn apply(&mut self, agent: AgentConfig) {
        let AgentConfig {
            llm,
            consolidation,
            retry,
        } = agent;

        if let Some(provider) = llm.provider {
            self.provider = provider;
        }
        if llm.model.is_some() {
            self.model = llm.model;
        }
        if let Some(endpoint) = llm.endpoint {
            match self.provider.to_lowercase().as_str() {
                "ollama" => self.ollama_url = Some(endpoint),
                _ => self.openai_base_url = Some(endpoint),
            }
        }
        if let Some(key_env) = llm.api_key_env {
            self.openai_api_key = env::var(key_env).ok();
        }
        if let Some(max_tokens) = llm.max_tokens {
            self.completion.max_tokens = max_tokens;
        }
        if let Some(temperature) = llm.temperature {
            self.completion.temperature = temperature;
        }

        if let Some(size) = consolidation.size_threshold {
            self.policy.size_threshold = size;
        }
        if let Some(minutes) = consolidation.time_threshold_minutes {
            self.policy.time_threshold_minutes = minutes;
        }

        if let Some(attempts) = retry.attempts {
            self.retry.attempts = attempts;
        }
        if let Some(ms) = retry.base_delay_ms {
            self.retry.base_delay = Duration::from_millis(ms);
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("memloop.db")
    }
}
