//! Checkpointer trait and CheckpointError.

use async_trait::async_trait;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Saves and loads per-thread state snapshots.
///
/// The compiled graph writes at step boundaries; `get_latest` returns the
/// newest snapshot for a thread. Values must round-trip message lists,
/// override flags, and accumulated turn summaries.
///
/// **Interaction**: injected via `StateGraph::compile_with_checkpointer`;
/// the HTTP layer reads/deletes through the same handle.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    /// Persist the state for `thread_id`, replacing any prior snapshot.
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError>;

    /// Load the latest snapshot for `thread_id`, if any.
    async fn get_latest(&self, thread_id: &str) -> Result<Option<S>, CheckpointError>;

    /// Remove the snapshot for `thread_id`; missing threads are a no-op.
    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError>;
}
