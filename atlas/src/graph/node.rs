//! Graph node trait: one step in a StateGraph.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::AgentError;

use super::RunContext;

/// One step in a graph: state in, state out.
///
/// Routing is owned by the graph (unconditional edges and conditional
/// routers), not by the node. Nodes that stream incremental output implement
/// `run_with_context`; the default ignores the context.
#[async_trait]
pub trait Node<S>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Node id (e.g. `"agent"`, `"generate_sql"`). Unique within a graph.
    fn id(&self) -> &str;

    /// One step: read the state, return the updated state.
    async fn run(&self, state: S) -> Result<S, AgentError>;

    /// Variant with run context (stream writer, thread/session config).
    async fn run_with_context(&self, state: S, _ctx: &RunContext<S>) -> Result<S, AgentError> {
        self.run(state).await
    }
}
