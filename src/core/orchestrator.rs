//! The memory orchestration state machine
//!
//! One `MemoryOrchestrator` drives one conversation instance through
//! `AwaitingInput -> Processing -> MaybeConsolidating -> AwaitingInput`.
//! For each input it:
//! 1. Appends the input to the short-term buffer and checkpoints
//!    (if that checkpoint fails the input is dropped again and an error returned)
//! 2. Requests a completion (a failure degrades the response, never the buffer)
//! 3. Asks the [`ConsolidationPolicy`] whether the epoch is due
//! 4. If due, writes the whole buffer as one batch and starts a new epoch
//! 5. Checkpoints again; a failure here is logged and picked up by the next save
//!
//! Time is always passed in by the driver. Nothing here reads the clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::{CompletionFailure, CompletionService};
use crate::storage::{CheckpointStore, LongTermStore, MemoryEntry, StoreError};

use super::checkpoint::{Checkpoint, NovelInput};
use super::policy::ConsolidationPolicy;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[source] StoreError),

    #[error("Instance {0} is no longer running")]
    InstanceClosed(String),
}

/// Token budget and sampling temperature for completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            max_tokens: 100,
            temperature: 0.7,
        }
    }
}

/// The external services an orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub completion: Arc<dyn CompletionService>,
    pub long_term: Arc<dyn LongTermStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
}

/// Observability view of an instance's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    pub size: usize,
    pub epoch_elapsed_minutes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidationOutcome {
    NotDue,
    /// The batch for `epoch` was written and a new epoch started
    Committed { epoch: u64, entries: usize },
    /// The write failed; the buffer is kept and the epoch will be re-sent
    Deferred(String),
}

/// What one input produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub response: String,
    pub failure: Option<CompletionFailure>,
    pub consolidation: ConsolidationOutcome,
}

pub fn novel_input_prompt(input: &str) -> String {
    format!("Process this input and provide insights: {}", input)
}

/// Expand a buffer into the entries of one consolidation batch.
///
/// Row keys depend only on instance, epoch and position, so a batch that is
/// re-sent after a crash lands on the same keys.
pub fn consolidation_batch(instance_id: &str, checkpoint: &Checkpoint) -> Vec<MemoryEntry> {
    checkpoint
        .buffer
        .iter()
        .enumerate()
        .map(|(index, input)| MemoryEntry {
            partition_key: format!("stm:{}", instance_id),
            row_key: format!("{}:{}:{}", instance_id, checkpoint.epoch, index),
            input: input.text.clone(),
            response: input.response.clone().unwrap_or_default(),
            sentiment: None,
            timestamp: input.received_at,
        })
        .collect()
}

pub struct MemoryOrchestrator {
    instance_id: String,
    checkpoint: Checkpoint,
    policy: ConsolidationPolicy,
    settings: CompletionSettings,
    collaborators: Collaborators,
}

impl MemoryOrchestrator {
    /// Rebuild an instance from its last checkpoint, or start epoch 0 at `now`.
    ///
    /// Only reads the checkpoint store; a fresh instance is first saved with
    /// its first input. No completion is re-issued for inputs already in the
    /// buffer.
    pub async fn recover(
        instance_id: impl Into<String>,
        policy: ConsolidationPolicy,
        settings: CompletionSettings,
        collaborators: Collaborators,
        now: DateTime<Utc>,
    ) -> Result<Self, OrchestratorError> {
        let instance_id = instance_id.into();

        let loaded = collaborators
            .checkpoints
            .load(&instance_id)
            .await
            .map_err(OrchestratorError::Checkpoint)?;

        let checkpoint = match loaded {
            Some(checkpoint) => {
                tracing::info!(
                    "[{}] Recovered epoch {} with {} buffered input(s)",
                    instance_id,
                    checkpoint.epoch,
                    checkpoint.buffer.len()
                );
                checkpoint
            }
            None => {
                tracing::info!("[{}] Starting new instance", instance_id);
                Checkpoint::start(now)
            }
        };

        Ok(Self {
            instance_id,
            checkpoint,
            policy,
            settings,
            collaborators,
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn buffer_state(&self, now: DateTime<Utc>) -> BufferState {
        BufferState {
            size: self.checkpoint.buffer.len(),
            epoch_elapsed_minutes: self.checkpoint.epoch_elapsed(now).num_minutes(),
        }
    }

    /// Handle one novel input received at `now`.
    pub async fn process(
        &mut self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, OrchestratorError> {
        tracing::info!("[{}] Received novel input: {}", self.instance_id, text);
        self.checkpoint.buffer.push(NovelInput::new(text, now));
        if let Err(e) = self.persist().await {
            self.checkpoint.buffer.pop();
            return Err(e);
        }

        let prompt = novel_input_prompt(text);
        let (response, failure) = match self
            .collaborators
            .completion
            .complete(&prompt, self.settings.max_tokens, self.settings.temperature)
            .await
        {
            Ok(response) => {
                if let Some(input) = self.checkpoint.buffer.last_mut() {
                    input.response = Some(response.clone());
                }
                (response, None)
            }
            Err(failure) => {
                if failure.is_transient() {
                    tracing::warn!("[{}] Completion failed: {}", self.instance_id, failure);
                } else {
                    tracing::error!("[{}] Completion refused: {}", self.instance_id, failure);
                }
                (failure.degraded_response().to_string(), Some(failure))
            }
        };

        let consolidation = self.maybe_consolidate(now).await;
        if let Err(e) = self.persist().await {
            // If this save is lost, recovery re-sends the epoch under the same row keys.
            tracing::error!("[{}] {}", self.instance_id, e);
        }

        Ok(StepOutcome {
            response,
            failure,
            consolidation,
        })
    }

    async fn maybe_consolidate(&mut self, now: DateTime<Utc>) -> ConsolidationOutcome {
        let elapsed = self.checkpoint.epoch_elapsed(now).num_minutes();
        if !self
            .policy
            .should_consolidate(self.checkpoint.buffer.len(), elapsed)
        {
            return ConsolidationOutcome::NotDue;
        }

        let entries = consolidation_batch(&self.instance_id, &self.checkpoint);
        match self.collaborators.long_term.insert_batch(&entries).await {
            Ok(()) => {
                let epoch = self.checkpoint.epoch;
                tracing::info!(
                    "[{}] Consolidated epoch {} ({} entries) into long-term memory",
                    self.instance_id,
                    epoch,
                    entries.len()
                );
                self.checkpoint = Checkpoint {
                    epoch: epoch + 1,
                    epoch_start: now,
                    buffer: Vec::new(),
                };
                ConsolidationOutcome::Committed {
                    epoch,
                    entries: entries.len(),
                }
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Consolidation of epoch {} failed, keeping buffer: {}",
                    self.instance_id,
                    self.checkpoint.epoch,
                    e
                );
                ConsolidationOutcome::Deferred(e.to_string())
            }
        }
    }

    async fn persist(&self) -> Result<(), OrchestratorError> {
        self.collaborators
            .checkpoints
            .save(&self.instance_id, &self.checkpoint)
            .await
            .map_err(OrchestratorError::Checkpoint)
    }
}
