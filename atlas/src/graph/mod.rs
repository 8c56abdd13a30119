//! State graph: nodes + explicit edges with conditional routing.
//!
//! Build with [`StateGraph`]: `add_node` / `add_edge(from, to)` using
//! [`START`] and [`END`], `add_conditional_edges` for state-based routing,
//! then `compile()` or `compile_with_checkpointer()` to obtain a
//! [`CompiledStateGraph`] that can `invoke` or `stream`.

mod compile_error;
mod compiled;
mod conditional;
mod node;
mod retry;
mod run_context;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::CompiledStateGraph;
pub use conditional::{ConditionalRouter, ConditionalRouterFn, NextEntry};
pub use node::Node;
pub use retry::RetryPolicy;
pub use run_context::RunContext;
pub use state_graph::{StateGraph, END, START};
