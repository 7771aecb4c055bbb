//! Question/answer history.
//!
//! The answering path hands every computed answer to a [`HistorySink`].
//! [`SqliteHistory`] keeps entries per user in SQLite; [`NoopHistory`]
//! discards them.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use docqa_core::models::UserIdentity;

use crate::db;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub user: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, user: &UserIdentity, question: &str, answer: &str) -> Result<()>;

    /// Entries for `user`, newest first.
    async fn entries(&self, user: &UserIdentity) -> Result<Vec<HistoryEntry>>;
}

/// Discards history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistory;

#[async_trait]
impl HistorySink for NoopHistory {
    async fn record(&self, _user: &UserIdentity, _question: &str, _answer: &str) -> Result<()> {
        Ok(())
    }

    async fn entries(&self, _user: &UserIdentity) -> Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }
}

pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                user_key TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_user ON history(user_key, created_at)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl HistorySink for SqliteHistory {
    async fn record(&self, user: &UserIdentity, question: &str, answer: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO history (id, user_key, question, answer, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user.as_str())
        .bind(question)
        .bind(answer)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await
        .context("Failed to record history entry")?;
        Ok(())
    }

    async fn entries(&self, user: &UserIdentity) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_key, question, answer, created_at
            FROM history
            WHERE user_key = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<HistoryEntry> {
                let micros: i64 = row.try_get("created_at")?;
                Ok(HistoryEntry {
                    id: row.try_get("id")?,
                    user: row.try_get("user_key")?,
                    question: row.try_get("question")?,
                    answer: row.try_get("answer")?,
                    created_at: DateTime::from_timestamp_micros(micros)
                        .with_context(|| format!("invalid timestamp {}", micros))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_entries_are_per_user_newest_first() {
        let tmp = TempDir::new().unwrap();
        let history = SqliteHistory::open(&tmp.path().join("history.sqlite"))
            .await
            .unwrap();
        let alice = UserIdentity::new("alice");
        let bob = UserIdentity::new("bob");

        history.record(&alice, "first?", "one").await.unwrap();
        history.record(&bob, "other?", "x").await.unwrap();
        history.record(&alice, "second?", "two").await.unwrap();

        let entries = history.entries(&alice).await.unwrap();
        let questions: Vec<&str> = entries.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, ["second?", "first?"]);
        assert!(entries.iter().all(|e| e.user == "alice"));

        assert_eq!(history.entries(&bob).await.unwrap().len(), 1);
        assert!(history
            .entries(&UserIdentity::new("carol"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_noop_history_keeps_nothing() {
        let user = UserIdentity::new("u");
        NoopHistory.record(&user, "q", "a").await.unwrap();
        assert!(NoopHistory.entries(&user).await.unwrap().is_empty());
    }
}
