//! SQLite-backed chat history, scoped by session id.
//!
//! The answer pipeline never touches this store directly; the transport
//! layer reads history out and passes turns in per call.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::chat::ChatTurn;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
    pub additional_kwargs: Option<Value>,
}

impl HistoryMessage {
    /// View of this message as a pipeline chat turn. The timestamp prefers
    /// the one recorded at send time, falling back to the row's insert time.
    pub fn to_chat_turn(&self) -> ChatTurn {
        let timestamp = self
            .additional_kwargs
            .as_ref()
            .and_then(|k| k.get("timestamp"))
            .and_then(|v| v.as_f64())
            .or_else(|| {
                chrono::DateTime::parse_from_rfc3339(&self.created_at)
                    .ok()
                    .map(|dt| dt.timestamp() as f64)
            })
            .unwrap_or(0.0);

        ChatTurn {
            role: self.role.clone(),
            content: self.content.clone(),
            timestamp,
        }
    }
}

#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to history db: {}", e)))?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to enable foreign keys: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init sessions table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                additional_kwargs JSON,
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init messages table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        additional_kwargs: Option<Value>,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, updated_at) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        let result = sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at, additional_kwargs)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(&now)
        .bind(additional_kwargs)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// The most recent `limit` messages for a session, oldest first.
    /// A non-positive limit returns the whole session.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<HistoryMessage>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
            )
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query("SELECT * FROM messages WHERE session_id = ? ORDER BY id ASC")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        let mut messages = Vec::new();
        for row in rows {
            messages.push(HistoryMessage {
                id: row.try_get::<i64, _>("id").unwrap_or_default(),
                session_id: row.try_get::<String, _>("session_id").unwrap_or_default(),
                role: row.try_get::<String, _>("role").unwrap_or_default(),
                content: row.try_get::<String, _>("content").unwrap_or_default(),
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
                additional_kwargs: row
                    .try_get::<Option<Value>, _>("additional_kwargs")
                    .unwrap_or(None),
            });
        }

        Ok(messages)
    }

    pub async fn total_message_count(&self) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .map(|r| r.get(0))
            .unwrap_or(0);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn temp_store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("chat.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn messages_round_trip_in_order() {
        let (_dir, store) = temp_store().await;

        store
            .add_message("s1", "user", "primeira", None)
            .await
            .unwrap();
        store
            .add_message("s1", "assistant", "segunda", None)
            .await
            .unwrap();

        let history = store.get_history("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "primeira");
        assert_eq!(history[1].role, "assistant");
    }

    #[tokio::test]
    async fn limit_keeps_the_most_recent_messages() {
        let (_dir, store) = temp_store().await;

        for i in 1..=6 {
            store
                .add_message("s1", "user", &format!("m{}", i), None)
                .await
                .unwrap();
        }

        let history = store.get_history("s1", 3).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5", "m6"]);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (_dir, store) = temp_store().await;

        store.add_message("a", "user", "oi", None).await.unwrap();
        store.add_message("b", "user", "olá", None).await.unwrap();

        assert_eq!(store.get_history("a", 10).await.unwrap().len(), 1);
        assert_eq!(store.total_message_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn chat_turn_prefers_kwargs_timestamp() {
        let (_dir, store) = temp_store().await;
        store
            .add_message("s1", "user", "oi", Some(json!({"timestamp": 1718000000.5})))
            .await
            .unwrap();

        let history = store.get_history("s1", 1).await.unwrap();
        let turn = history[0].to_chat_turn();
        assert_eq!(turn.timestamp, 1718000000.5);
        assert_eq!(turn.role, "user");
    }
}
