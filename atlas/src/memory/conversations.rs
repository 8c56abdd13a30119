//! Conversation registry: thread → session index for the listing endpoints.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::checkpointer::CheckpointError;

/// One conversation row, keyed by thread id with a secondary index on
/// session id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub thread_id: String,
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation persistence. `upsert` inserts or refreshes `updated_at` and
/// the title; deleting a missing thread is a no-op.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn upsert(&self, conversation: Conversation) -> Result<(), CheckpointError>;
    async fn get(&self, thread_id: &str) -> Result<Option<Conversation>, CheckpointError>;
    async fn list_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Conversation>, CheckpointError>;
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}

/// In-memory registry for tests and storeless bootstrap.
#[derive(Default)]
pub struct InMemoryConversationStore {
    rows: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn upsert(&self, conversation: Conversation) -> Result<(), CheckpointError> {
        self.rows
            .write()
            .await
            .insert(conversation.thread_id.clone(), conversation);
        Ok(())
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Conversation>, CheckpointError> {
        Ok(self.rows.read().await.get(thread_id).cloned())
    }

    async fn list_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Conversation>, CheckpointError> {
        let mut rows: Vec<Conversation> = self
            .rows
            .read()
            .await
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.rows.write().await.remove(thread_id);
        Ok(())
    }
}

/// SQLite-backed registry.
pub struct SqliteConversationStore {
    db_path: std::path::PathBuf,
}

impl SqliteConversationStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                thread_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_conversations_session
                ON conversations (session_id, updated_at);
            "#,
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
        let created_at: String = row.get(3)?;
        let updated_at: String = row.get(4)?;
        Ok(Conversation {
            thread_id: row.get(0)?,
            session_id: row.get(1)?,
            title: row.get(2)?,
            created_at: created_at
                .parse()
                .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
            updated_at: updated_at
                .parse()
                .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn upsert(&self, conversation: Conversation) -> Result<(), CheckpointError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                r#"
                INSERT INTO conversations (thread_id, session_id, title, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(thread_id) DO UPDATE SET
                    title = excluded.title,
                    updated_at = excluded.updated_at
                "#,
                params![
                    conversation.thread_id,
                    conversation.session_id,
                    conversation.title,
                    conversation.created_at.to_rfc3339(),
                    conversation.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Conversation>, CheckpointError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT thread_id, session_id, title, created_at, updated_at
                     FROM conversations WHERE thread_id = ?1",
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query_map(params![thread_id], Self::row_to_conversation)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            match rows.next() {
                Some(row) => row
                    .map(Some)
                    .map_err(|e| CheckpointError::Storage(e.to_string())),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn list_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<Conversation>, CheckpointError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare(
                    "SELECT thread_id, session_id, title, created_at, updated_at
                     FROM conversations WHERE session_id = ?1
                     ORDER BY updated_at DESC",
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![session_id], Self::row_to_conversation)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CheckpointError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "DELETE FROM conversations WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
