//! Caller-side retry for transient completion failures

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};

use super::{CompletionFailure, CompletionService};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Doubling delays starting at `base_delay`, `attempts - 1` retries at most.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(2.0)
            .with_max_times(self.attempts.saturating_sub(1) as usize)
    }
}

/// Wraps a [`CompletionService`] and retries rate limits and outages.
///
/// Authorization failures are returned on the first occurrence.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: CompletionService> CompletionService for Retrying<S> {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, CompletionFailure> {
        (|| self.inner.complete(prompt, max_tokens, temperature))
            .retry(self.policy.backoff())
            .when(CompletionFailure::is_transient)
            .notify(|failure, delay| {
                tracing::warn!("Completion failed ({}), retrying in {:?}", failure, delay);
            })
            .await
    }
}
