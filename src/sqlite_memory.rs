//! SQLite-backed session memory.
//!
//! Same window semantics as [`InMemoryStore`](crate::memory::InMemoryStore),
//! but history survives restarts. Messages live in one table keyed by
//! `(session_id, seq)`; after every append the rows older than the window
//! are deleted in the same transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::memory::MemoryStore;
use crate::models::{Message, Role};

pub struct SqliteMemoryStore {
    pool: SqlitePool,
    window: usize,
}

impl SqliteMemoryStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub async fn open(path: &Path, window: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create memory directory: {}", parent.display())
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open memory database: {}", path.display()))?;

        let store = Self { pool, window };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_messages (
                session_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get(&self, session_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content FROM session_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                let content: String = row.get("content");
                Ok(Message::with_role(role.parse::<Role>()?, content))
            })
            .collect()
    }

    async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM session_messages WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO session_messages (session_id, seq, role, content, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(next)
        .bind(role.as_str())
        .bind(content)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM session_messages WHERE session_id = ? AND seq <= ?")
            .bind(session_id)
            .bind(next - self.window as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    fn window(&self) -> usize {
        self.window
    }
}
