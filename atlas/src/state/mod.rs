//! Agent state: the single structure flowing through every graph node.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AgentMode, TradeDirection, TradeMode, TradeSchema};
use crate::links::AtlasLink;
use crate::message::Message;
use crate::pipelines::graphql::types::{ApiTarget, EntityExtraction, QueryClassification};
use crate::pipelines::sql::lookup::SchemasAndProducts;

/// One executed SQL query, recorded for the answer payload and turn summary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub tables: Vec<String>,
}

/// Structured summary of one completed turn, accumulated across the
/// conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub question: String,
    pub schemas_used: Vec<String>,
    pub queries: usize,
    pub atlas_links: Vec<AtlasLink>,
    pub total_rows: usize,
    pub total_execution_time_ms: u64,
}

/// State carried through each node of the agent graph.
///
/// `messages` and `turn_summaries` are append-only for the conversation
/// lifetime (use [`push_messages`](Self::push_messages) and
/// [`append_turn_summaries`](Self::append_turn_summaries)); `pipeline_*`,
/// `graphql_*`, and `docs_*` fields are scratch space per tool invocation;
/// the `override_*` fields live for the whole conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AtlasAgentState {
    pub messages: Vec<Message>,
    /// Tool calls that reached execution this turn.
    pub queries_executed: u32,
    pub last_error: String,

    // SQL pipeline scratch
    pub pipeline_question: String,
    pub pipeline_context: String,
    pub pipeline_products: Option<SchemasAndProducts>,
    pub pipeline_codes: String,
    pub pipeline_table_info: String,
    pub pipeline_sql: String,
    pub pipeline_result: String,
    pub pipeline_result_columns: Vec<String>,
    pub pipeline_result_rows: Vec<Vec<Value>>,
    pub pipeline_execution_time_ms: u64,

    // GraphQL pipeline scratch
    pub graphql_question: String,
    pub graphql_context: String,
    pub graphql_classification: Option<QueryClassification>,
    pub graphql_entity_extraction: Option<EntityExtraction>,
    pub graphql_resolved_params: Option<Value>,
    pub graphql_query: Option<String>,
    pub graphql_api_target: Option<ApiTarget>,
    pub graphql_raw_response: Option<Value>,
    pub graphql_execution_time_ms: u64,
    pub graphql_atlas_links: Vec<AtlasLink>,

    // Docs pipeline scratch
    pub docs_question: String,
    pub docs_answer: String,

    // Per-turn bookkeeping
    pub turn_queries: Vec<QueryRecord>,
    pub nudge_issued: bool,

    // Conversation-lifetime
    pub turn_summaries: Vec<TurnSummary>,
    pub override_schema: Option<TradeSchema>,
    pub override_direction: Option<TradeDirection>,
    pub override_mode: Option<TradeMode>,
    pub override_agent_mode: Option<AgentMode>,
}

impl AtlasAgentState {
    /// Appends messages (append-only reducer semantics).
    pub fn push_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Appends turn summaries (append-only reducer semantics).
    pub fn append_turn_summaries(&mut self, summaries: impl IntoIterator<Item = TurnSummary>) {
        self.turn_summaries.extend(summaries);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Starts a new turn: records the user message and resets per-turn
    /// bookkeeping.
    pub fn begin_turn(&mut self, question: impl Into<String>) {
        self.messages.push(Message::human(question));
        self.queries_executed = 0;
        self.last_error.clear();
        self.turn_queries.clear();
        self.nudge_issued = false;
    }

    /// Resets every `graphql_*` field to its default, preventing cross-turn
    /// bleed between tool invocations.
    pub fn reset_graphql_fields(&mut self) {
        self.graphql_question = String::new();
        self.graphql_context = String::new();
        self.graphql_classification = None;
        self.graphql_entity_extraction = None;
        self.graphql_resolved_params = None;
        self.graphql_query = None;
        self.graphql_api_target = None;
        self.graphql_raw_response = None;
        self.graphql_execution_time_ms = 0;
        self.graphql_atlas_links = Vec::new();
    }

    /// Whether the `graphql_*` scratch equals its defaults.
    pub fn graphql_fields_are_default(&self) -> bool {
        self.graphql_question.is_empty()
            && self.graphql_context.is_empty()
            && self.graphql_classification.is_none()
            && self.graphql_entity_extraction.is_none()
            && self.graphql_resolved_params.is_none()
            && self.graphql_query.is_none()
            && self.graphql_api_target.is_none()
            && self.graphql_raw_response.is_none()
            && self.graphql_execution_time_ms == 0
            && self.graphql_atlas_links.is_empty()
    }

    /// Schemas selected by the SQL pipeline this turn.
    pub fn schemas_used(&self) -> Vec<String> {
        self.pipeline_products
            .as_ref()
            .map(|p| p.classification_schemas.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::graphql::types::QueryType;
    use serde_json::json;

    /// **Scenario**: the full state round-trips through serde, including
    /// messages, overrides, and turn summaries (checkpoint contract).
    #[test]
    fn state_roundtrip_serde() {
        let mut state = AtlasAgentState::default();
        state.begin_turn("Top 5 exports of Brazil in 2020");
        state.override_schema = Some(TradeSchema::Hs12);
        state.override_mode = Some(TradeMode::Goods);
        state.graphql_classification = Some(QueryClassification {
            reasoning: "treemap".into(),
            query_type: QueryType::TreemapProducts,
            rejection_reason: None,
            api_target: Some(ApiTarget::Explore),
        });
        state.append_turn_summaries([TurnSummary {
            question: "Top 5 exports of Brazil in 2020".into(),
            schemas_used: vec!["hs92".into()],
            queries: 1,
            atlas_links: vec![],
            total_rows: 5,
            total_execution_time_ms: 120,
        }]);

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: AtlasAgentState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(state, decoded);
    }

    /// **Scenario**: reset_graphql_fields restores every field default.
    #[test]
    fn graphql_reset_restores_defaults() {
        let mut state = AtlasAgentState {
            graphql_question: "exports of Kenya".into(),
            graphql_raw_response: Some(json!({"countryProductYear": []})),
            graphql_execution_time_ms: 42,
            graphql_atlas_links: vec![],
            ..Default::default()
        };
        state.graphql_api_target = Some(ApiTarget::CountryPages);
        assert!(!state.graphql_fields_are_default());
        state.reset_graphql_fields();
        assert!(state.graphql_fields_are_default());
    }

    /// **Scenario**: begin_turn resets per-turn counters but keeps the
    /// conversation history and overrides.
    #[test]
    fn begin_turn_resets_turn_scope_only() {
        let mut state = AtlasAgentState::default();
        state.override_direction = Some(TradeDirection::Imports);
        state.begin_turn("first");
        state.queries_executed = 2;
        state.nudge_issued = true;
        state.turn_queries.push(QueryRecord::default());

        state.begin_turn("second");
        assert_eq!(state.queries_executed, 0);
        assert!(!state.nudge_issued);
        assert!(state.turn_queries.is_empty());
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.override_direction, Some(TradeDirection::Imports));
    }
}
