//! SQL pipeline nodes.
//!
//! Linear chain: extract_tool_question → extract_products → lookup_codes →
//! get_table_info → generate_sql → validate_sql → (execute_sql |
//! format_results) → format_results → agent. Validation failures
//! short-circuit to format_results via the graph router; execution failures
//! populate `last_error` and let the agent decide whether to try again.

pub mod lookup;
pub mod prompts;
pub mod validation;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

use crate::cache::{keys, CacheRegistry, TtlCache};
use crate::config::TradeMode;
use crate::db::{with_retry, TableDescriptions, TradeDb};
use crate::error::AgentError;
use crate::graph::Node;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::state::{AtlasAgentState, QueryRecord};

use lookup::{ProductAndSchemaLookup, ProductDetails, SchemasAndProducts};
use prompts::{build_sql_generation_prompt, strip_sql_fences, ExampleQuery, SqlPromptInputs};
use validation::{extract_query_tables, extract_table_names_from_ddl, validate_sql};

pub const TABLE_INFO_MAXSIZE: usize = 32;
pub const TABLE_INFO_TTL: Duration = Duration::from_secs(3600);

const EXECUTE_MAX_ATTEMPTS: u32 = 3;
const EXECUTE_BACKOFF_BASE: Duration = Duration::from_millis(500);

pub const PARALLEL_CALL_STUB: &str =
    "Only one query can be executed at a time. Please make additional queries sequentially.";

/// Lifts question and context out of the agent's tool call.
pub struct ExtractToolQuestion;

#[async_trait]
impl Node<AtlasAgentState> for ExtractToolQuestion {
    fn id(&self) -> &str {
        "extract_tool_question"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "extract_tool_question reached without a tool call".into(),
            ));
        };
        if tool_calls.len() > 1 {
            warn!(
                count = tool_calls.len(),
                "model produced parallel tool calls; only the first will be executed"
            );
        }
        state.pipeline_question = first.arg_str("question");
        state.pipeline_context = first.arg_str("context");
        state.last_error.clear();
        Ok(state)
    }
}

/// Runs product/schema extraction, then applies the user overrides.
pub struct ExtractProducts {
    lookup: Arc<ProductAndSchemaLookup>,
}

impl ExtractProducts {
    pub fn new(lookup: Arc<ProductAndSchemaLookup>) -> Self {
        Self { lookup }
    }
}

fn apply_overrides(state: &AtlasAgentState, mut products: SchemasAndProducts) -> SchemasAndProducts {
    if let Some(schema) = state.override_schema {
        let schema = schema.as_str().to_string();
        products.products = products
            .products
            .into_iter()
            .map(|p| ProductDetails {
                classification_schema: schema.clone(),
                ..p
            })
            .collect();
        products.classification_schemas = vec![schema];
    } else if let Some(mode) = state.override_mode {
        let schemas = products.classification_schemas;
        products.classification_schemas = match mode {
            TradeMode::Goods => {
                let kept: Vec<String> = schemas
                    .into_iter()
                    .filter(|s| !s.starts_with("services_"))
                    .collect();
                if kept.is_empty() {
                    vec!["hs92".to_string()]
                } else {
                    kept
                }
            }
            TradeMode::Services => {
                let kept: Vec<String> = schemas
                    .into_iter()
                    .filter(|s| s.starts_with("services_"))
                    .collect();
                if kept.is_empty() {
                    vec!["services_unilateral".to_string()]
                } else {
                    kept
                }
            }
        };
    }
    products
}

#[async_trait]
impl Node<AtlasAgentState> for ExtractProducts {
    fn id(&self) -> &str {
        "extract_products"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let products = self.lookup.extract(&state.pipeline_question).await?;
        state.pipeline_products = Some(apply_overrides(&state, products));
        Ok(state)
    }
}

/// Gathers candidate codes and asks the model to pick the final set.
pub struct LookupCodes {
    lookup: Arc<ProductAndSchemaLookup>,
}

impl LookupCodes {
    pub fn new(lookup: Arc<ProductAndSchemaLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for LookupCodes {
    fn id(&self) -> &str {
        "lookup_codes"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let Some(products) = state.pipeline_products.clone() else {
            state.pipeline_codes = String::new();
            return Ok(state);
        };
        if products.products.is_empty() {
            state.pipeline_codes = String::new();
            return Ok(state);
        }
        let candidates = self.lookup.candidate_codes(&products).await?;
        let codes = self
            .lookup
            .select_final_codes(&state.pipeline_question, &candidates)
            .await?;
        state.pipeline_codes = lookup::format_product_codes_for_prompt(&codes);
        Ok(state)
    }
}

/// Assembles DDL for the selected schemas plus the classification lookup
/// tables, cached by the unordered schema set.
pub struct GetTableInfo {
    db: Arc<dyn TradeDb>,
    descriptions: TableDescriptions,
    cache: Arc<TtlCache<String, Value>>,
    registry: Arc<CacheRegistry>,
}

impl GetTableInfo {
    pub fn new(
        db: Arc<dyn TradeDb>,
        descriptions: TableDescriptions,
        registry: Arc<CacheRegistry>,
    ) -> Self {
        let cache = registry.create("table_info", TABLE_INFO_MAXSIZE, TABLE_INFO_TTL);
        Self {
            db,
            descriptions,
            cache,
            registry,
        }
    }

    async fn table_info_for_schemas(&self, schemas: &[String]) -> Result<String, AgentError> {
        let key = keys::table_info_key(schemas);
        if let Some(cached) = self.cache.get(&key) {
            self.registry.record_hit("table_info");
            return Ok(cached.as_str().unwrap_or_default().to_string());
        }
        self.registry.record_miss("table_info");

        let mut tables = self.descriptions.tables_in_schemas(schemas);
        tables.extend(self.descriptions.classification_tables_for(schemas));
        // Group-level aggregate tables are large and never useful here.
        tables.retain(|(name, _)| !name.contains(crate::db::GROUP_AGGREGATE_MARKER));

        let mut info = String::new();
        for (name, context) in tables {
            let ddl = self.db.table_ddl(std::slice::from_ref(&name)).await?;
            info.push_str(&format!("Table: {name}\nDescription: {context}\n{ddl}\n\n"));
        }
        self.cache.insert(key, Value::String(info.clone()));
        Ok(info)
    }
}

#[async_trait]
impl Node<AtlasAgentState> for GetTableInfo {
    fn id(&self) -> &str {
        "get_table_info"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let schemas = state.schemas_used();
        state.pipeline_table_info = self.table_info_for_schemas(&schemas).await?;
        Ok(state)
    }
}

/// Generates the SQL query with the few-shot prompt.
pub struct GenerateSql {
    llm: Arc<dyn LlmClient>,
    example_queries: Vec<ExampleQuery>,
    top_k: usize,
}

impl GenerateSql {
    pub fn new(llm: Arc<dyn LlmClient>, example_queries: Vec<ExampleQuery>, top_k: usize) -> Self {
        Self {
            llm,
            example_queries,
            top_k,
        }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for GenerateSql {
    fn id(&self) -> &str {
        "generate_sql"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let codes = (!state.pipeline_codes.is_empty()).then_some(state.pipeline_codes.as_str());
        let prompt = build_sql_generation_prompt(
            &SqlPromptInputs {
                codes,
                top_k: self.top_k,
                table_info: &state.pipeline_table_info,
                direction_constraint: state.override_direction,
                mode_constraint: state.override_mode,
                context: &state.pipeline_context,
            },
            &self.example_queries,
            &state.pipeline_question,
        );
        let response = self.llm.invoke(&[Message::human(prompt)], &[]).await?;
        state.pipeline_sql = strip_sql_fences(&response.content);
        Ok(state)
    }
}

/// Validates generated SQL; failures short-circuit to format_results.
pub struct ValidateSql {
    descriptions: TableDescriptions,
}

impl ValidateSql {
    pub fn new(descriptions: TableDescriptions) -> Self {
        Self { descriptions }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for ValidateSql {
    fn id(&self) -> &str {
        "validate_sql"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let mut valid_tables: BTreeSet<String> =
            extract_table_names_from_ddl(&state.pipeline_table_info);
        let schemas = state.schemas_used();
        for (name, _) in self.descriptions.tables_in_schemas(&schemas) {
            valid_tables.insert(name);
        }
        for (name, _) in self.descriptions.classification_tables_for(&schemas) {
            valid_tables.insert(name);
        }

        let result = validate_sql(&state.pipeline_sql, &valid_tables);
        if !result.is_valid {
            let message = format!("SQL validation failed: {}", result.errors.join("; "));
            warn!(%message, "rejecting generated SQL");
            state.pipeline_result = String::new();
            state.last_error = message;
        } else {
            state.pipeline_sql = result.sql;
            state.last_error.clear();
        }
        Ok(state)
    }
}

/// Executes the query read-only with bounded retry on transient driver
/// errors; failures populate `last_error` and return an empty result.
pub struct ExecuteSql {
    db: Arc<dyn TradeDb>,
}

impl ExecuteSql {
    pub fn new(db: Arc<dyn TradeDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for ExecuteSql {
    fn id(&self) -> &str {
        "execute_sql"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let sql = state.pipeline_sql.clone();
        let started = Instant::now();
        let result = with_retry(
            || self.db.execute(&sql),
            EXECUTE_MAX_ATTEMPTS,
            EXECUTE_BACKOFF_BASE,
        )
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                let rendered = output.render();
                state.pipeline_result = if rendered.trim().is_empty() {
                    "SQL query returned no results.".to_string()
                } else {
                    rendered
                };
                state.pipeline_result_columns = output.columns;
                state.pipeline_result_rows = output.rows;
                state.pipeline_execution_time_ms = elapsed_ms;
                state.last_error.clear();
            }
            Err(e) => {
                error!(error = %e, "query execution failed");
                state.pipeline_result = String::new();
                state.pipeline_result_columns = Vec::new();
                state.pipeline_result_rows = Vec::new();
                state.pipeline_execution_time_ms = 0;
                state.last_error = e.to_string();
            }
        }
        Ok(state)
    }
}

/// Posts a tool message for every tool-call id and counts the execution.
pub struct FormatResults;

#[async_trait]
impl Node<AtlasAgentState> for FormatResults {
    fn id(&self) -> &str {
        "format_results"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "format_results reached without a tool call".into(),
            ));
        };

        let content = if !state.last_error.is_empty() {
            format!("Error executing query: {}", state.last_error)
        } else if state.pipeline_result.is_empty() {
            "SQL query returned no results.".to_string()
        } else {
            state.pipeline_result.clone()
        };

        if state.last_error.is_empty() && !state.pipeline_sql.is_empty() {
            state.turn_queries.push(QueryRecord {
                sql: state.pipeline_sql.clone(),
                columns: state.pipeline_result_columns.clone(),
                rows: state.pipeline_result_rows.clone(),
                row_count: state.pipeline_result_rows.len(),
                execution_time_ms: state.pipeline_execution_time_ms,
                tables: extract_query_tables(&state.pipeline_sql).into_iter().collect(),
            });
        }

        let mut messages = vec![Message::tool(content, &first.id, "query_tool")];
        for tc in &tool_calls[1..] {
            messages.push(Message::tool(PARALLEL_CALL_STUB, &tc.id, "query_tool"));
        }
        state.push_messages(messages);
        state.queries_executed += 1;
        Ok(state)
    }
}

/// Terminal for the turn: every pending tool call gets a budget-exceeded
/// message so the agent must produce a final answer.
pub struct MaxQueriesExceeded;

#[async_trait]
impl Node<AtlasAgentState> for MaxQueriesExceeded {
    fn id(&self) -> &str {
        "max_queries_exceeded"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let messages: Vec<Message> = tool_calls
            .iter()
            .map(|tc| {
                Message::tool(
                    "Error: Maximum number of queries exceeded.",
                    &tc.id,
                    &tc.name,
                )
            })
            .collect();
        state.push_messages(messages);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeSchema;
    use crate::message::ToolCall;
    use serde_json::json;

    fn state_with_tool_call() -> AtlasAgentState {
        let mut state = AtlasAgentState::default();
        state.begin_turn("cotton exports of Brazil");
        state.push_messages([Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall {
                    id: "call_1".into(),
                    name: "query_tool".into(),
                    arguments: json!({"question": "cotton exports of Brazil", "context": "use 2020"}),
                },
                ToolCall {
                    id: "call_2".into(),
                    name: "query_tool".into(),
                    arguments: json!({"question": "something else"}),
                },
            ],
        )]);
        state
    }

    /// **Scenario**: the first of parallel tool calls is processed.
    #[tokio::test]
    async fn extract_takes_first_tool_call() {
        let state = ExtractToolQuestion
            .run(state_with_tool_call())
            .await
            .unwrap();
        assert_eq!(state.pipeline_question, "cotton exports of Brazil");
        assert_eq!(state.pipeline_context, "use 2020");
    }

    /// **Scenario**: schema override rewrites every product schema and
    /// collapses the schema list.
    #[test]
    fn schema_override_rewrites_products() {
        let mut state = AtlasAgentState::default();
        state.override_schema = Some(TradeSchema::Hs12);
        let products = SchemasAndProducts {
            classification_schemas: vec!["hs92".into(), "services_unilateral".into()],
            products: vec![ProductDetails {
                name: "cotton".into(),
                classification_schema: "hs92".into(),
                codes: vec!["5201".into()],
            }],
            requires_product_lookup: true,
            countries: vec![],
        };
        let out = apply_overrides(&state, products);
        assert_eq!(out.classification_schemas, vec!["hs12"]);
        assert_eq!(out.products[0].classification_schema, "hs12");
    }

    /// **Scenario**: mode override filters schemas, with documented defaults
    /// when the filter empties the list.
    #[test]
    fn mode_override_filters_schemas() {
        let mut state = AtlasAgentState::default();
        state.override_mode = Some(TradeMode::Goods);
        let out = apply_overrides(
            &state,
            SchemasAndProducts {
                classification_schemas: vec!["services_unilateral".into()],
                ..Default::default()
            },
        );
        assert_eq!(out.classification_schemas, vec!["hs92"]);

        state.override_mode = Some(TradeMode::Services);
        let out = apply_overrides(
            &state,
            SchemasAndProducts {
                classification_schemas: vec!["hs92".into(), "services_bilateral".into()],
                ..Default::default()
            },
        );
        assert_eq!(out.classification_schemas, vec!["services_bilateral"]);
    }

    /// **Scenario**: format_results answers every tool call (stub for the
    /// extras) and increments the execution counter.
    #[tokio::test]
    async fn format_results_balances_tool_calls() {
        let mut state = state_with_tool_call();
        state.pipeline_sql = "SELECT 1".into();
        state.pipeline_result = "{'x': 1}".into();
        state.pipeline_result_rows = vec![vec![json!(1)]];
        let state = FormatResults.run(state).await.unwrap();

        let tool_messages: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[0].content(), "{'x': 1}");
        assert_eq!(tool_messages[1].content(), PARALLEL_CALL_STUB);
        assert_eq!(state.queries_executed, 1);
        assert_eq!(state.turn_queries.len(), 1);
        assert_eq!(state.turn_queries[0].row_count, 1);
        assert!(crate::message::unanswered_tool_calls(&state.messages).is_empty());
    }

    /// **Scenario**: an execution error surfaces in the tool message and no
    /// query record is kept.
    #[tokio::test]
    async fn format_results_on_error() {
        let mut state = state_with_tool_call();
        state.pipeline_sql = "SELECT 1".into();
        state.last_error = "relation does not exist".into();
        let state = FormatResults.run(state).await.unwrap();
        assert!(state.messages.iter().any(|m| m
            .content()
            .starts_with("Error executing query: relation does not exist")));
        assert!(state.turn_queries.is_empty());
    }

    /// **Scenario**: max_queries_exceeded answers every pending call.
    #[tokio::test]
    async fn max_queries_answers_all_calls() {
        let state = MaxQueriesExceeded
            .run(state_with_tool_call())
            .await
            .unwrap();
        let tool_messages: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| matches!(m, Message::Tool { .. }))
            .collect();
        assert_eq!(tool_messages.len(), 2);
        assert!(tool_messages
            .iter()
            .all(|m| m.content().contains("Maximum number of queries exceeded")));
    }
}
