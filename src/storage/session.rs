//! Per-identity session history using SQLite

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::{SessionStore, StoreError};

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append(&self, identity: &str, message: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO session_messages (identity, message) VALUES (?, ?)")
            .bind(identity)
            .bind(message)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Stored session message for {}", identity);
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT message
            FROM session_messages
            WHERE identity = ?
            ORDER BY id ASC
            "#,
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(message,)| message).collect())
    }
}
