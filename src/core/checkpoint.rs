//! Short-term buffer contents and the durable snapshot of an orchestrator

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One buffered input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelInput {
    pub text: String,
    pub received_at: DateTime<Utc>,
    /// Set once the completion for this input succeeded
    #[serde(default)]
    pub response: Option<String>,
}

impl NovelInput {
    pub fn new(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
            response: None,
        }
    }
}

/// Where an orchestrator instance is: its epoch and the unconsolidated buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of consolidations committed so far
    pub epoch: u64,
    pub epoch_start: DateTime<Utc>,
    pub buffer: Vec<NovelInput>,
}

impl Checkpoint {
    /// A fresh instance: epoch 0, empty buffer.
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            epoch: 0,
            epoch_start: now,
            buffer: Vec::new(),
        }
    }

    /// Time since the epoch started, never negative.
    pub fn epoch_elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.epoch_start).max(Duration::zero())
    }
}
