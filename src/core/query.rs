//! Cached question answering
//!
//! Before paying for a completion, look for a stored answer to a matching
//! input. Store failures fall through to the completion path, and completion
//! failures come back as a degraded string, so every query gets an answer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::CompletionService;
use crate::storage::{LongTermStore, MemoryEntry};

use super::orchestrator::CompletionSettings;

/// Partition for answers produced by the query path
pub const QUERY_PARTITION: &str = "AI_Memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    /// Served from long-term memory, no completion issued
    Memory,
    Completion,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub response: String,
    pub source: AnswerSource,
}

pub fn query_prompt(query: &str) -> String {
    format!("Learn from the following input and respond: {}", query)
}

/// The newest entry that carries an answer. On equal timestamps the entry
/// the store returned first wins.
pub fn latest_answer(entries: &[MemoryEntry]) -> Option<&MemoryEntry> {
    entries
        .iter()
        .filter(|e| e.has_answer())
        .fold(None, |best: Option<&MemoryEntry>, entry| match best {
            Some(b) if b.timestamp >= entry.timestamp => Some(b),
            _ => Some(entry),
        })
}

pub struct QueryOrchestrator {
    completion: Arc<dyn CompletionService>,
    long_term: Arc<dyn LongTermStore>,
    settings: CompletionSettings,
}

impl QueryOrchestrator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        long_term: Arc<dyn LongTermStore>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            completion,
            long_term,
            settings,
        }
    }

    pub async fn handle(&self, query: &str, now: DateTime<Utc>) -> QueryAnswer {
        tracing::info!("[Query] Processing input: {}", query);

        match self.long_term.query(query).await {
            Ok(entries) => {
                if let Some(hit) = latest_answer(&entries) {
                    tracing::info!("[Query] Found past response in {}", hit.row_key);
                    return QueryAnswer {
                        response: hit.response.clone(),
                        source: AnswerSource::Memory,
                    };
                }
            }
            Err(e) => tracing::warn!("[Query] Memory lookup failed, treating as miss: {}", e),
        }

        let response = match self
            .completion
            .complete(
                &query_prompt(query),
                self.settings.max_tokens,
                self.settings.temperature,
            )
            .await
        {
            Ok(response) => response,
            Err(failure) => {
                tracing::error!("[Query] Completion failed: {}", failure);
                return QueryAnswer {
                    response: failure.degraded_response().to_string(),
                    source: AnswerSource::Degraded,
                };
            }
        };

        let entry = MemoryEntry {
            partition_key: QUERY_PARTITION.to_string(),
            row_key: uuid::Uuid::new_v4().to_string(),
            input: query.to_string(),
            response: response.clone(),
            sentiment: None,
            timestamp: now,
        };
        if let Err(e) = self.long_term.insert_batch(std::slice::from_ref(&entry)).await {
            tracing::error!("[Query] Failed to store new memory {}: {}", entry.row_key, e);
        }

        QueryAnswer {
            response,
            source: AnswerSource::Completion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CompletionFailure;
    use crate::testing::{minutes_after_start, RecordingStore, ScriptedCompletion};

    fn entry(row_key: &str, response: &str, minute: i64) -> MemoryEntry {
        MemoryEntry {
            partition_key: QUERY_PARTITION.to_string(),
            row_key: row_key.to_string(),
            input: "hello".to_string(),
            response: response.to_string(),
            sentiment: None,
            timestamp: minutes_after_start(minute),
        }
    }

    fn orchestrator(
        completion: &Arc<ScriptedCompletion>,
        store: &Arc<RecordingStore>,
    ) -> QueryOrchestrator {
        QueryOrchestrator::new(
            completion.clone(),
            store.clone(),
            CompletionSettings::default(),
        )
    }

    #[test]
    fn test_latest_answer_prefers_newest() {
        let entries = vec![entry("a", "old", 1), entry("b", "new", 5), entry("c", "mid", 3)];
        assert_eq!(latest_answer(&entries).unwrap().row_key, "b");
    }

    #[test]
    fn test_latest_answer_tie_keeps_store_order() {
        let entries = vec![entry("first", "x", 2), entry("second", "y", 2)];
        assert_eq!(latest_answer(&entries).unwrap().row_key, "first");
    }

    #[test]
    fn test_latest_answer_skips_empty_responses() {
        let entries = vec![entry("blank", "", 9), entry("real", "hi", 1)];
        assert_eq!(latest_answer(&entries).unwrap().row_key, "real");
        assert!(latest_answer(&[entry("blank", "", 9)]).is_none());
    }

    #[tokio::test]
    async fn test_second_query_is_served_from_memory() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("hi there".into())]));
        let store = Arc::new(RecordingStore::default());
        let calls = completion.calls();
        let query = orchestrator(&completion, &store);

        let first = query.handle("hello", minutes_after_start(0)).await;
        let second = query.handle("hello", minutes_after_start(1)).await;

        assert_eq!(first.response, "hi there");
        assert_eq!(first.source, AnswerSource::Completion);
        assert_eq!(second.response, "hi there");
        assert_eq!(second.source, AnswerSource::Memory);
        assert_eq!(calls.count(), 1);
        assert_eq!(
            completion.prompts(),
            vec!["Learn from the following input and respond: hello".to_string()]
        );
    }

    #[tokio::test]
    async fn test_store_failure_falls_through_to_completion() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("fresh".into())]));
        let store = Arc::new(RecordingStore::default());
        store.fail_queries(true);
        let query = orchestrator(&completion, &store);

        let answer = query.handle("hello", minutes_after_start(0)).await;
        assert_eq!(answer.response, "fresh");
        assert_eq!(answer.source, AnswerSource::Completion);
    }

    #[tokio::test]
    async fn test_completion_failure_is_degraded_and_not_stored() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Err(
            CompletionFailure::Unauthorized("no key".into()),
        )]));
        let store = Arc::new(RecordingStore::default());
        let query = orchestrator(&completion, &store);

        let answer = query.handle("hello", minutes_after_start(0)).await;
        assert_eq!(answer.response, "Error: No API key");
        assert_eq!(answer.source, AnswerSource::Degraded);
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_still_returns_response() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("fresh".into())]));
        let store = Arc::new(RecordingStore::default());
        store.fail_writes(true);
        let query = orchestrator(&completion, &store);

        let answer = query.handle("hello", minutes_after_start(0)).await;
        assert_eq!(answer.response, "fresh");
    }
}
