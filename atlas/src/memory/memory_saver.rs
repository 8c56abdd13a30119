//! In-memory checkpointer. Dev, tests, and bootstrap without a store path.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::checkpointer::{CheckpointError, Checkpointer};

/// Keeps the latest snapshot per thread in a `RwLock<HashMap>`.
#[derive(Default)]
pub struct MemorySaver<S> {
    snapshots: RwLock<HashMap<String, S>>,
}

impl<S> MemorySaver<S> {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S> Checkpointer<S> for MemorySaver<S>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    async fn put(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError> {
        self.snapshots
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<S>, CheckpointError> {
        Ok(self.snapshots.read().await.get(thread_id).cloned())
    }

    async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        self.snapshots.write().await.remove(thread_id);
        Ok(())
    }
}
