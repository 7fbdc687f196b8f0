//! Test doubles for the orchestrator collaborators

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::core::{Checkpoint, Clock};
use crate::providers::{CompletionFailure, CompletionService};
use crate::storage::{CheckpointStore, LongTermStore, MemoryEntry, StoreError};

pub fn minutes_after_start(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Plays back scripted results, then answers every prompt by echoing it.
#[derive(Default)]
pub struct ScriptedCompletion {
    script: Mutex<VecDeque<Result<String, CompletionFailure>>>,
    prompts: Mutex<Vec<String>>,
    calls: CallCounter,
}

impl ScriptedCompletion {
    pub fn new(script: Vec<Result<String, CompletionFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn echo() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String, CompletionFailure> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("echo: {}", prompt)))
    }
}

/// In-memory long-term store that keeps every batch it was handed.
#[derive(Default)]
pub struct RecordingStore {
    batches: Mutex<Vec<Vec<MemoryEntry>>>,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
}

impl RecordingStore {
    pub fn batches(&self) -> Vec<Vec<MemoryEntry>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LongTermStore for RecordingStore {
    async fn insert_batch(&self, entries: &[MemoryEntry]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.batches.lock().unwrap().push(entries.to_vec());
        Ok(())
    }

    async fn query(&self, substring: &str) -> Result<Vec<MemoryEntry>, StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .filter(|e| e.input.contains(substring))
            .cloned()
            .collect())
    }

    async fn tag_sentiment(&self, row_key: &str, sentiment: &str) -> Result<(), StoreError> {
        let mut batches = self.batches.lock().unwrap();
        let entry = batches
            .iter_mut()
            .flatten()
            .find(|e| e.row_key == row_key)
            .ok_or_else(|| StoreError::NotFound(row_key.to_string()))?;
        entry.sentiment = Some(sentiment.to_string());
        Ok(())
    }
}

/// In-memory checkpoints; can be told to start failing saves after a while.
#[derive(Default)]
pub struct MemoryCheckpoints {
    saved: Mutex<HashMap<String, Checkpoint>>,
    saves_left: Mutex<Option<usize>>,
}

impl MemoryCheckpoints {
    pub fn get(&self, instance_id: &str) -> Option<Checkpoint> {
        self.saved.lock().unwrap().get(instance_id).cloned()
    }

    /// Accept `saves` more saves, then fail every save until [`Self::heal`].
    pub fn fail_after(&self, saves: usize) {
        *self.saves_left.lock().unwrap() = Some(saves);
    }

    pub fn heal(&self) {
        *self.saves_left.lock().unwrap() = None;
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        {
            let mut saves_left = self.saves_left.lock().unwrap();
            match *saves_left {
                Some(0) => return Err(StoreError::Database(sqlx::Error::PoolTimedOut)),
                Some(n) => *saves_left = Some(n - 1),
                None => {}
            }
        }
        self.saved
            .lock()
            .unwrap()
            .insert(instance_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.get(instance_id))
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(minutes_after_start(0)),
        }
    }
}

impl ManualClock {
    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += Duration::minutes(minutes);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
