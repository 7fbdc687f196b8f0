//! Long-term memory storage using SQLite

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{format_datetime, parse_datetime, LongTermStore, MemoryEntry, StoreError};

/// SQLite-backed [`LongTermStore`]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub(crate) async fn count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memory_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

type EntryRow = (String, String, String, String, Option<String>, String);

fn entry_from_row(row: EntryRow) -> Result<MemoryEntry, StoreError> {
    let (partition_key, row_key, input, response, sentiment, timestamp) = row;
    Ok(MemoryEntry {
        partition_key,
        row_key,
        input,
        response,
        sentiment,
        timestamp: parse_datetime(&timestamp)?,
    })
}

#[async_trait]
impl LongTermStore for SqliteMemoryStore {
    async fn insert_batch(&self, entries: &[MemoryEntry]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO memory_entries
                    (row_key, partition_key, input, response, sentiment, timestamp)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(row_key) DO NOTHING
                "#,
            )
            .bind(&entry.row_key)
            .bind(&entry.partition_key)
            .bind(&entry.input)
            .bind(&entry.response)
            .bind(&entry.sentiment)
            .bind(format_datetime(&entry.timestamp))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, substring: &str) -> Result<Vec<MemoryEntry>, StoreError> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT partition_key, row_key, input, response, sentiment, timestamp
            FROM memory_entries
            WHERE instr(input, ?) > 0
            ORDER BY timestamp DESC
            "#,
        )
        .bind(substring)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn tag_sentiment(&self, row_key: &str, sentiment: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE memory_entries SET sentiment = ? WHERE row_key = ?")
            .bind(sentiment)
            .bind(row_key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(row_key.to_string()));
        }
        Ok(())
    }
}
