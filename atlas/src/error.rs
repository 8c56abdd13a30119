//! Crate-wide agent error type.
//!
//! Every graph node returns `Result<_, AgentError>`. Lower layers keep their
//! own error enums (`GraphQLClientError`, `DbError`, `CacheError`,
//! `CheckpointError`) and convert into this at the node boundary.

use thiserror::Error;

use crate::cache::CacheError;
use crate::db::DbError;
use crate::graphql::GraphQLClientError;
use crate::memory::CheckpointError;

/// Error produced while running the agent graph.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM invocation failed (provider error, malformed structured output).
    #[error("llm: {0}")]
    Llm(String),

    /// LLM returned structured output that failed schema validation.
    #[error("structured output: {0}")]
    StructuredOutput(String),

    /// Graph-level failure (missing state, step ceiling, unknown node).
    #[error("graph: {0}")]
    Graph(String),

    /// Trade database failure.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Remote GraphQL failure.
    #[error(transparent)]
    GraphQL(#[from] GraphQLClientError),

    /// Catalog cache failure (programming errors included).
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Checkpoint persistence failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl AgentError {
    /// Whether a retry at the node layer could plausibly succeed.
    ///
    /// Only transient upstream conditions qualify; schema validation and
    /// programming errors never do.
    pub fn is_transient(&self) -> bool {
        match self {
            AgentError::Llm(_) => true,
            AgentError::Database(e) => e.is_transient(),
            AgentError::GraphQL(e) => matches!(e, GraphQLClientError::Transient(_)),
            AgentError::StructuredOutput(_)
            | AgentError::Graph(_)
            | AgentError::Cache(_)
            | AgentError::Checkpoint(_) => false,
        }
    }
}
