//! Orchestrator checkpoints using SQLite
//!
//! One row per instance, replaced wholesale by a single UPSERT so a reader
//! never sees half of a transition.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{format_datetime, parse_datetime, CheckpointStore, StoreError};
use crate::core::{Checkpoint, NovelInput};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, instance_id: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let buffer = serde_json::to_string(&checkpoint.buffer)?;
        let epoch = i64::try_from(checkpoint.epoch)
            .map_err(|_| StoreError::Corrupt(format!("epoch {} out of range", checkpoint.epoch)))?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (instance_id, epoch, epoch_start, buffer, updated_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(instance_id) DO UPDATE SET
                epoch = excluded.epoch,
                epoch_start = excluded.epoch_start,
                buffer = excluded.buffer,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(instance_id)
        .bind(epoch)
        .bind(format_datetime(&checkpoint.epoch_start))
        .bind(buffer)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, instance_id: &str) -> Result<Option<Checkpoint>, StoreError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT epoch, epoch_start, buffer FROM checkpoints WHERE instance_id = ?",
        )
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((epoch, epoch_start, buffer)) = row else {
            return Ok(None);
        };

        let buffer: Vec<NovelInput> = serde_json::from_str(&buffer)?;
        Ok(Some(Checkpoint {
            epoch: u64::try_from(epoch)
                .map_err(|_| StoreError::Corrupt(format!("negative epoch {}", epoch)))?,
            epoch_start: parse_datetime(&epoch_start)?,
            buffer,
        }))
    }
}
