//! # atlas
//!
//! Natural-language-to-data agent for a trade-economics database, built on a
//! **state-in, state-out** graph: one shared state type flows through nodes
//! with conditional routing, per-node retries, and cross-turn checkpointing.
//!
//! A user question enters the HTTP layer (the `serve` crate), is assigned a
//! thread, and runs through the agent graph: the agent node consults the
//! model to pick a tool; one of three pipelines (SQL, GraphQL, docs) runs to
//! its terminal node, which posts a tool message back into state; control
//! returns to the agent until it produces the final answer. The streaming
//! layer relays typed events throughout.
//!
//! ## Main modules
//!
//! - [`graph`]: generic [`StateGraph`]/[`CompiledStateGraph`] engine.
//! - [`state`]: [`AtlasAgentState`], the single state structure.
//! - [`agent`]: the reasoning node, tool schemas, and graph assembly
//!   ([`build_agent_graph`]).
//! - [`pipelines`]: the SQL, GraphQL, and docs node sets.
//! - [`llm`]: [`LlmClient`] trait, [`ChatOpenAI`], [`MockLlm`].
//! - [`cache`]: [`CatalogCache`], [`TtlCache`], [`CacheRegistry`].
//! - [`graphql`]: [`BudgetTracker`], [`CircuitBreaker`],
//!   [`AtlasGraphQLClient`].
//! - [`db`]: [`TradeDb`] seam, [`PostgresDb`], [`MockTradeDb`].
//! - [`links`]: deterministic presentation-page URL builders.
//! - [`memory`]: [`Checkpointer`] + conversation registry.
//! - [`service`]: [`AtlasService`], the non-streaming and streaming answer
//!   surfaces.
//! - [`config`]: [`AppConfig`] and the closed override vocabularies.

pub mod agent;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod graphql;
pub mod links;
pub mod llm;
pub mod memory;
pub mod message;
pub mod pipelines;
pub mod service;
pub mod state;
pub mod stream;

pub use agent::build::{build_agent_graph, AgentGraphDeps};
pub use agent::{resolve_effective_mode, AgentNode};
pub use cache::{CacheError, CacheRegistry, CatalogCache, TtlCache};
pub use config::{AgentMode, AppConfig, TradeDirection, TradeMode, TradeSchema};
pub use db::{DbError, MockTradeDb, PostgresDb, QueryOutput, TableDescriptions, TradeDb};
pub use error::AgentError;
pub use graph::{
    CompilationError, CompiledStateGraph, Node, RetryPolicy, RunContext, StateGraph, END, START,
};
pub use graphql::{
    AtlasGraphQLClient, BudgetTracker, CircuitBreaker, CircuitState, GraphQLClientError,
    GraphQLExecutor,
};
pub use links::{generate_atlas_links, AtlasLink, LinkType};
pub use llm::{ChatOpenAI, LlmClient, LlmResponse, MockLlm, ToolSpec};
pub use memory::{
    CheckpointError, Checkpointer, Conversation, ConversationStore, InMemoryConversationStore,
    MemorySaver, RunnableConfig, SqliteConversationStore, SqliteSaver,
};
pub use message::{Message, ToolCall};
pub use service::{AnswerResult, AtlasService, ChatOverrides};
pub use state::{AtlasAgentState, QueryRecord, TurnSummary};
pub use stream::{MessageChunk, StreamEvent, StreamMetadata, StreamMode};
