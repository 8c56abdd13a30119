//! SQLite-backed checkpointer. Persistent across process restarts.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::checkpointer::{CheckpointError, Checkpointer};

/// SQLite checkpointer keyed by thread id; the payload is the full state as
/// JSON. Single-node and dev deployments; uses `spawn_blocking` for async.
pub struct SqliteSaver<S> {
    db_path: std::path::PathBuf,
    _marker: PhantomData<fn() -> S>,
}

impl<S> SqliteSaver<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                ts TEXT NOT NULL,
                payload BLOB NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<S> Checkpointer<S> for SqliteSaver<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + Debug + 'static,
{
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError> {
        let payload = serde_json::to_vec(state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let ts = chrono::Utc::now().to_rfc3339();
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, ts, payload) VALUES (?1, ?2, ?3)",
                params![thread_id, ts, payload],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<S>, CheckpointError> {
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        let payload: Option<Vec<u8>> = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT payload FROM checkpoints WHERE thread_id = ?1")
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let mut rows = stmt
                .query(params![thread_id])
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            match rows
                .next()
                .map_err(|e| CheckpointError::Storage(e.to_string()))?
            {
                Some(row) => {
                    let payload: Vec<u8> = row
                        .get(0)
                        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                    Ok::<_, CheckpointError>(Some(payload))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        match payload {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            conn.execute(
                "DELETE FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}
