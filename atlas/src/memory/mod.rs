//! Persistence: per-thread checkpoints and the conversation registry.
//!
//! [`Checkpointer`] snapshots the full agent state per thread at step
//! boundaries; [`ConversationStore`] keeps the thread → session index used
//! by the HTTP listing endpoints. Both come in a SQLite flavor for
//! single-node deployments and an in-memory flavor for tests and bootstrap
//! without a backing store.

mod checkpointer;
mod config;
mod conversations;
mod memory_saver;
mod sqlite_saver;

pub use checkpointer::{CheckpointError, Checkpointer};
pub use config::RunnableConfig;
pub use conversations::{
    Conversation, ConversationStore, InMemoryConversationStore, SqliteConversationStore,
};
pub use memory_saver::MemorySaver;
pub use sqlite_saver::SqliteSaver;
