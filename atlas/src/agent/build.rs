//! Assembles the full agent graph: the agent node plus the three pipelines,
//! wired with conditional routing and per-node retry policies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheRegistry, CatalogCache};
use crate::config::AgentMode;
use crate::db::{TableDescriptions, TradeDb};
use crate::graph::{CompilationError, CompiledStateGraph, RetryPolicy, StateGraph, END, START};
use crate::graphql::{BudgetTracker, GraphQLExecutor};
use crate::llm::LlmClient;
use crate::memory::Checkpointer;
use crate::pipelines::docs::{
    docs_manifest, ExtractDocsQuestion, FormatDocsResults, SelectAndSynthesize,
};
use crate::pipelines::graphql::types::QueryType;
use crate::pipelines::graphql::{
    BuildAndExecuteGraphql, ClassifyQuery, ExtractEntities, ExtractGraphqlQuestion,
    FormatGraphqlResults, ResolveIds,
};
use crate::pipelines::sql::lookup::ProductAndSchemaLookup;
use crate::pipelines::sql::prompts::{default_example_queries, ExampleQuery};
use crate::pipelines::sql::{
    ExecuteSql, ExtractProducts, ExtractToolQuestion, FormatResults, GenerateSql, GetTableInfo,
    LookupCodes, MaxQueriesExceeded, ValidateSql,
};
use crate::state::AtlasAgentState;

use super::tools::{ATLAS_GRAPHQL_TOOL, DOCS_TOOL, QUERY_TOOL};
use super::AgentNode;

/// Everything the graph needs, threaded from the composition root.
pub struct AgentGraphDeps {
    /// Frontier model for agent reasoning and SQL generation.
    pub llm: Arc<dyn LlmClient>,
    /// Lightweight model for extraction, classification, and resolution.
    pub lightweight_llm: Arc<dyn LlmClient>,
    pub db: Arc<dyn TradeDb>,
    pub registry: Arc<CacheRegistry>,
    pub country_catalog: Arc<CatalogCache>,
    pub product_catalog: Arc<CatalogCache>,
    pub services_catalog: Arc<CatalogCache>,
    pub explore_client: Arc<dyn GraphQLExecutor>,
    pub country_pages_client: Option<Arc<dyn GraphQLExecutor>>,
    pub budget: Option<Arc<BudgetTracker>>,
    pub table_descriptions: TableDescriptions,
    pub example_queries: Option<Vec<ExampleQuery>>,
    pub agent_mode: AgentMode,
    pub max_uses: u32,
    pub top_k: usize,
    pub checkpointer: Option<Arc<dyn Checkpointer<AtlasAgentState>>>,
    pub nudge_enabled: bool,
}

/// Routing after the agent node.
fn route_after_agent(state: &AtlasAgentState, max_uses: u32) -> String {
    let Some(last) = state.last_message() else {
        return END.to_string();
    };
    let tool_calls = last.tool_calls();
    let Some(first) = tool_calls.first() else {
        return END.to_string();
    };
    // docs_tool bypasses the query budget: check before the gate.
    if first.name == DOCS_TOOL {
        return "extract_docs_question".to_string();
    }
    if state.queries_executed >= max_uses {
        return "max_queries_exceeded".to_string();
    }
    match first.name.as_str() {
        QUERY_TOOL => "extract_tool_question".to_string(),
        ATLAS_GRAPHQL_TOOL => "extract_graphql_question".to_string(),
        // Unknown tool: end the turn rather than fabricate a tool message.
        _ => END.to_string(),
    }
}

fn route_after_classify(state: &AtlasAgentState) -> String {
    let rejected = state
        .graphql_classification
        .as_ref()
        .map(|c| c.query_type == QueryType::Reject)
        .unwrap_or(true);
    if rejected {
        "format_graphql_results".to_string()
    } else {
        "extract_entities".to_string()
    }
}

fn route_after_validation(state: &AtlasAgentState) -> String {
    if state.last_error.is_empty() {
        "execute_sql".to_string()
    } else {
        "format_results".to_string()
    }
}

/// Builds and compiles the agent graph.
pub fn build_agent_graph(
    deps: AgentGraphDeps,
) -> Result<CompiledStateGraph<AtlasAgentState>, CompilationError> {
    let llm_retry = RetryPolicy::exponential(
        3,
        Duration::from_millis(500),
        Duration::from_secs(5),
        1.5,
    );

    let lookup = Arc::new(ProductAndSchemaLookup::new(
        Arc::clone(&deps.lightweight_llm),
        Arc::clone(&deps.db),
        Arc::clone(&deps.registry),
    ));
    let example_queries = deps
        .example_queries
        .unwrap_or_else(default_example_queries);

    let mut graph = StateGraph::<AtlasAgentState>::new();

    // Agent node
    graph.add_node(
        "agent",
        Arc::new(
            AgentNode::new(
                Arc::clone(&deps.llm),
                deps.agent_mode,
                deps.max_uses,
                deps.top_k,
                deps.budget.clone(),
            )
            .with_nudge(deps.nudge_enabled),
        ),
    );

    // SQL pipeline nodes
    graph.add_node("extract_tool_question", Arc::new(ExtractToolQuestion));
    graph.add_node_with_retry(
        "extract_products",
        Arc::new(ExtractProducts::new(Arc::clone(&lookup))),
        llm_retry,
    );
    graph.add_node_with_retry(
        "lookup_codes",
        Arc::new(LookupCodes::new(Arc::clone(&lookup))),
        llm_retry,
    );
    graph.add_node(
        "get_table_info",
        Arc::new(GetTableInfo::new(
            Arc::clone(&deps.db),
            deps.table_descriptions.clone(),
            Arc::clone(&deps.registry),
        )),
    );
    graph.add_node_with_retry(
        "generate_sql",
        Arc::new(GenerateSql::new(
            Arc::clone(&deps.llm),
            example_queries,
            deps.top_k,
        )),
        llm_retry,
    );
    graph.add_node(
        "validate_sql",
        Arc::new(ValidateSql::new(deps.table_descriptions)),
    );
    graph.add_node("execute_sql", Arc::new(ExecuteSql::new(Arc::clone(&deps.db))));
    graph.add_node("format_results", Arc::new(FormatResults));
    graph.add_node("max_queries_exceeded", Arc::new(MaxQueriesExceeded));

    // GraphQL pipeline nodes. LLM-backed nodes get the retry policy;
    // build_and_execute does not: the client retries internally.
    graph.add_node("extract_graphql_question", Arc::new(ExtractGraphqlQuestion));
    graph.add_node_with_retry(
        "classify_query",
        Arc::new(ClassifyQuery::new(Arc::clone(&deps.lightweight_llm))),
        llm_retry,
    );
    graph.add_node_with_retry(
        "extract_entities",
        Arc::new(ExtractEntities::new(Arc::clone(&deps.lightweight_llm))),
        llm_retry,
    );
    graph.add_node_with_retry(
        "resolve_ids",
        Arc::new(ResolveIds::new(
            Arc::clone(&deps.lightweight_llm),
            Arc::clone(&deps.country_catalog),
            Arc::clone(&deps.product_catalog),
            Arc::clone(&deps.services_catalog),
        )),
        llm_retry,
    );
    graph.add_node(
        "build_and_execute_graphql",
        Arc::new(BuildAndExecuteGraphql::new(
            Arc::clone(&deps.explore_client),
            deps.country_pages_client.clone(),
        )),
    );
    graph.add_node(
        "format_graphql_results",
        Arc::new(FormatGraphqlResults::new(
            Some(Arc::clone(&deps.product_catalog)),
            Some(Arc::clone(&deps.country_catalog)),
        )),
    );

    // Docs pipeline nodes
    graph.add_node("extract_docs_question", Arc::new(ExtractDocsQuestion));
    graph.add_node_with_retry(
        "select_and_synthesize",
        Arc::new(SelectAndSynthesize::new(
            Arc::clone(&deps.lightweight_llm),
            docs_manifest(),
        )),
        llm_retry,
    );
    graph.add_node("format_docs_results", Arc::new(FormatDocsResults));

    // Edges
    graph.add_edge(START, "agent");
    let max_uses = deps.max_uses;
    graph.add_conditional_edges(
        "agent",
        Arc::new(move |state: &AtlasAgentState| route_after_agent(state, max_uses)),
        Some(path_map(&[
            "extract_tool_question",
            "extract_graphql_question",
            "extract_docs_question",
            "max_queries_exceeded",
            END,
        ])),
    );

    // SQL pipeline
    graph.add_edge("extract_tool_question", "extract_products");
    graph.add_edge("extract_products", "lookup_codes");
    graph.add_edge("lookup_codes", "get_table_info");
    graph.add_edge("get_table_info", "generate_sql");
    graph.add_edge("generate_sql", "validate_sql");
    graph.add_conditional_edges(
        "validate_sql",
        Arc::new(route_after_validation),
        Some(path_map(&["execute_sql", "format_results"])),
    );
    graph.add_edge("execute_sql", "format_results");
    graph.add_edge("format_results", "agent");
    graph.add_edge("max_queries_exceeded", "agent");

    // GraphQL pipeline
    graph.add_edge("extract_graphql_question", "classify_query");
    graph.add_conditional_edges(
        "classify_query",
        Arc::new(route_after_classify),
        Some(path_map(&["format_graphql_results", "extract_entities"])),
    );
    graph.add_edge("extract_entities", "resolve_ids");
    graph.add_edge("resolve_ids", "build_and_execute_graphql");
    graph.add_edge("build_and_execute_graphql", "format_graphql_results");
    graph.add_edge("format_graphql_results", "agent");

    // Docs pipeline
    graph.add_edge("extract_docs_question", "select_and_synthesize");
    graph.add_edge("select_and_synthesize", "format_docs_results");
    graph.add_edge("format_docs_results", "agent");

    match deps.checkpointer {
        Some(checkpointer) => graph.compile_with_checkpointer(checkpointer),
        None => graph.compile(),
    }
}

fn path_map(targets: &[&str]) -> HashMap<String, String> {
    targets
        .iter()
        .map(|t| (t.to_string(), t.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ToolCall};
    use serde_json::json;

    fn state_with_call(tool: &str, queries_executed: u32) -> AtlasAgentState {
        let mut state = AtlasAgentState::default();
        state.queries_executed = queries_executed;
        state.push_messages([Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: tool.into(),
                arguments: json!({"question": "q"}),
            }],
        )]);
        state
    }

    /// **Scenario**: agent routing: docs bypasses the budget gate, the gate
    /// catches the data tools, unknown tools end the turn.
    #[test]
    fn agent_routing_table() {
        assert_eq!(
            route_after_agent(&state_with_call("query_tool", 0), 3),
            "extract_tool_question"
        );
        assert_eq!(
            route_after_agent(&state_with_call("atlas_graphql", 0), 3),
            "extract_graphql_question"
        );
        assert_eq!(
            route_after_agent(&state_with_call("docs_tool", 3), 3),
            "extract_docs_question"
        );
        assert_eq!(
            route_after_agent(&state_with_call("query_tool", 3), 3),
            "max_queries_exceeded"
        );
        // max_uses = 0 blocks the very first data tool call.
        assert_eq!(
            route_after_agent(&state_with_call("atlas_graphql", 0), 0),
            "max_queries_exceeded"
        );
        assert_eq!(route_after_agent(&state_with_call("unknown_tool", 0), 3), END);

        let mut no_calls = AtlasAgentState::default();
        no_calls.push_messages([Message::assistant("final answer")]);
        assert_eq!(route_after_agent(&no_calls, 3), END);
    }

    /// **Scenario**: validation routing short-circuits on last_error.
    #[test]
    fn validation_routing() {
        let mut state = AtlasAgentState::default();
        assert_eq!(route_after_validation(&state), "execute_sql");
        state.last_error = "SQL validation failed: x".into();
        assert_eq!(route_after_validation(&state), "format_results");
    }
}
