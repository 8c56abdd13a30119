//! Pure projection of agent state into presentation-friendly
//! `pipeline_state` payloads, keyed by node name.
//!
//! The node set is sealed: an unknown name flowing through the projector is
//! a programming error, not a user error.

use serde_json::{json, Value};

use crate::error::AgentError;
use crate::state::AtlasAgentState;

/// Nodes that produce `pipeline_state` events.
pub const PROJECTED_NODES: [&str; 17] = [
    "extract_tool_question",
    "extract_products",
    "lookup_codes",
    "get_table_info",
    "generate_sql",
    "validate_sql",
    "execute_sql",
    "format_results",
    "max_queries_exceeded",
    "extract_graphql_question",
    "classify_query",
    "extract_entities",
    "resolve_ids",
    "build_and_execute_graphql",
    "format_graphql_results",
    "extract_docs_question",
    "select_and_synthesize",
];

/// Projects the post-node state for `node` into an event payload.
///
/// Returns `None` for nodes that intentionally produce no event (the agent
/// node, docs formatting); unknown names are an error.
pub fn project_pipeline_state(
    node: &str,
    state: &AtlasAgentState,
) -> Result<Option<Value>, AgentError> {
    let payload = match node {
        "agent" | "format_docs_results" => return Ok(None),
        "extract_tool_question" => json!({
            "stage": node,
            "question": state.pipeline_question,
            "context": state.pipeline_context,
        }),
        "extract_products" => {
            let products = state.pipeline_products.as_ref();
            json!({
                "stage": node,
                "schemas": products.map(|p| p.classification_schemas.clone()).unwrap_or_default(),
                "products": products
                    .map(|p| p.products.iter().map(|d| d.name.clone()).collect::<Vec<_>>())
                    .unwrap_or_default(),
                "requiresLookup": products.map(|p| p.requires_product_lookup).unwrap_or(false),
            })
        }
        "lookup_codes" => json!({
            "stage": node,
            "codes": state.pipeline_codes,
        }),
        "get_table_info" => json!({
            "stage": node,
            "tables": crate::pipelines::sql::validation::extract_table_names_from_ddl(
                &state.pipeline_table_info
            )
            .into_iter()
            .collect::<Vec<_>>(),
        }),
        "generate_sql" => json!({
            "stage": node,
            "sql": state.pipeline_sql,
        }),
        "validate_sql" => json!({
            "stage": node,
            "valid": state.last_error.is_empty(),
            "error": state.last_error,
        }),
        "execute_sql" => json!({
            "stage": node,
            "columns": state.pipeline_result_columns,
            "rows": state.pipeline_result_rows,
            "rowCount": state.pipeline_result_rows.len(),
            "executionTimeMs": state.pipeline_execution_time_ms,
            "sql": state.pipeline_sql,
            "tables": crate::pipelines::sql::validation::extract_query_tables(&state.pipeline_sql)
                .into_iter()
                .collect::<Vec<_>>(),
        }),
        "format_results" => json!({
            "stage": node,
            "queriesExecuted": state.queries_executed,
        }),
        "max_queries_exceeded" => json!({
            "stage": node,
            "queriesExecuted": state.queries_executed,
        }),
        "extract_graphql_question" => json!({
            "stage": node,
            "question": state.graphql_question,
        }),
        "classify_query" => {
            let classification = state.graphql_classification.as_ref();
            json!({
                "stage": node,
                "queryType": classification.map(|c| c.query_type.as_str()),
                "apiTarget": classification.and_then(|c| c.api_target),
                "rejectionReason": classification.and_then(|c| c.rejection_reason.clone()),
            })
        }
        "extract_entities" => json!({
            "stage": node,
            "entities": state.graphql_entity_extraction,
        }),
        "resolve_ids" => json!({
            "stage": node,
            "resolvedParams": state.graphql_resolved_params,
            "atlasLinks": state.graphql_atlas_links.len(),
        }),
        "build_and_execute_graphql" => json!({
            "stage": node,
            "query": state.graphql_query,
            "executionTimeMs": state.graphql_execution_time_ms,
            "error": state.last_error,
        }),
        "format_graphql_results" => json!({
            "stage": node,
            "atlasLinks": state.graphql_atlas_links,
            "queryIndex": state.queries_executed,
        }),
        "extract_docs_question" => json!({
            "stage": node,
            "question": state.docs_question,
        }),
        "select_and_synthesize" => json!({
            "stage": node,
            "answerChars": state.docs_answer.chars().count(),
        }),
        unknown => {
            return Err(AgentError::Graph(format!(
                "unknown node '{unknown}' in pipeline-state projector"
            )))
        }
    };
    Ok(Some(payload))
}
