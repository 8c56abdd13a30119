//! GraphQL pipeline nodes.
//!
//! Linear chain with one branch: extract_graphql_question → classify_query →
//! (extract_entities | format_graphql_results) → resolve_ids →
//! build_and_execute_graphql → format_graphql_results → agent. The LLM-backed
//! nodes let errors propagate so the graph retry policy can act;
//! build_and_execute never raises: it classifies failures into
//! `last_error` (the client already retried internally).

pub mod builders;
pub mod post_process;
pub mod prompts;
pub mod resolve;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::cache::CatalogCache;
use crate::error::AgentError;
use crate::graph::{Node, RunContext};
use crate::graphql::{GraphQLClientError, GraphQLExecutor};
use crate::links::generate_atlas_links;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::state::AtlasAgentState;

use builders::build_graphql_query;
use post_process::post_process_response;
use prompts::{build_classification_prompt, build_extraction_prompt};
use resolve::{format_ids_for_api, EntityResolver};
use types::{classification_schema, extraction_schema, ApiTarget, EntityExtraction, QueryClassification, QueryType};

pub use crate::pipelines::sql::PARALLEL_CALL_STUB;

/// Lifts question and context out of the tool call; resets every `graphql_*`
/// field to prevent cross-turn bleed.
pub struct ExtractGraphqlQuestion;

#[async_trait]
impl Node<AtlasAgentState> for ExtractGraphqlQuestion {
    fn id(&self) -> &str {
        "extract_graphql_question"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "extract_graphql_question reached without a tool call".into(),
            ));
        };
        if tool_calls.len() > 1 {
            warn!(
                count = tool_calls.len(),
                "model produced parallel tool calls; only the first will be executed"
            );
        }
        state.reset_graphql_fields();
        state.graphql_question = first.arg_str("question");
        state.graphql_context = first.arg_str("context");
        state.last_error.clear();
        Ok(state)
    }
}

/// Classifies the question into a query type and endpoint.
pub struct ClassifyQuery {
    llm: Arc<dyn LlmClient>,
}

impl ClassifyQuery {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for ClassifyQuery {
    fn id(&self) -> &str {
        "classify_query"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let prompt = build_classification_prompt(&state.graphql_question, &state.graphql_context);
        let value = self
            .llm
            .invoke_structured(
                &[Message::human(prompt)],
                "query_classification",
                &classification_schema(),
            )
            .await?;
        let classification = QueryClassification::from_value(value)?;
        state.graphql_api_target = classification.api_target;
        state.graphql_classification = Some(classification);
        Ok(state)
    }
}

/// Extracts countries, products, and years; skipped when rejected.
pub struct ExtractEntities {
    llm: Arc<dyn LlmClient>,
}

impl ExtractEntities {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for ExtractEntities {
    fn id(&self) -> &str {
        "extract_entities"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let query_type = state
            .graphql_classification
            .as_ref()
            .map(|c| c.query_type)
            .unwrap_or(QueryType::Reject);
        if query_type == QueryType::Reject {
            state.graphql_entity_extraction = None;
            return Ok(state);
        }
        let prompt = build_extraction_prompt(
            &state.graphql_question,
            query_type.as_str(),
            &state.graphql_context,
        );
        let value = self
            .llm
            .invoke_structured(
                &[Message::human(prompt)],
                "entity_extraction",
                &extraction_schema(),
            )
            .await?;
        state.graphql_entity_extraction = Some(EntityExtraction::from_value(value)?);
        Ok(state)
    }
}

/// Resolves extracted entities to catalog ids, generates presentation links,
/// then formats ids for the target endpoint.
pub struct ResolveIds {
    llm: Arc<dyn LlmClient>,
    country_catalog: Arc<CatalogCache>,
    product_catalog: Arc<CatalogCache>,
    services_catalog: Arc<CatalogCache>,
}

impl ResolveIds {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        country_catalog: Arc<CatalogCache>,
        product_catalog: Arc<CatalogCache>,
        services_catalog: Arc<CatalogCache>,
    ) -> Self {
        Self {
            llm,
            country_catalog,
            product_catalog,
            services_catalog,
        }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for ResolveIds {
    fn id(&self) -> &str {
        "resolve_ids"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let Some(classification) = state.graphql_classification.clone() else {
            state.graphql_resolved_params = None;
            state.graphql_atlas_links = Vec::new();
            return Ok(state);
        };
        if classification.query_type == QueryType::Reject {
            state.graphql_resolved_params = None;
            state.graphql_atlas_links = Vec::new();
            return Ok(state);
        }
        let Some(extraction) = state.graphql_entity_extraction.clone() else {
            state.graphql_resolved_params = None;
            state.graphql_atlas_links = Vec::new();
            return Ok(state);
        };

        let api_target = classification
            .api_target
            .or(state.graphql_api_target)
            .unwrap_or(ApiTarget::Explore);
        let question = state.graphql_question.clone();

        let mut resolved = Map::new();
        let mut resolution_notes: Vec<String> = Vec::new();

        if extraction.mentions_country() {
            let resolver = EntityResolver {
                cache: &self.country_catalog,
                index_name: "iso3",
                search_field: "nameShortEn",
                llm: &self.llm,
                question: &question,
            };
            if let Some(country) = resolver
                .resolve(
                    extraction.country_name.as_deref(),
                    extraction.country_code_guess.as_deref(),
                )
                .await?
            {
                resolved.insert("country_id".into(), country["countryId"].clone());
                resolved.insert(
                    "country_name".into(),
                    country
                        .get("nameShortEn")
                        .cloned()
                        .unwrap_or_else(|| json!(extraction.country_name)),
                );
            } else {
                resolution_notes.push(format!(
                    "Could not resolve country '{}' in catalog",
                    extraction
                        .country_name
                        .as_deref()
                        .or(extraction.country_code_guess.as_deref())
                        .unwrap_or_default()
                ));
            }
        }

        if extraction.mentions_partner() {
            let resolver = EntityResolver {
                cache: &self.country_catalog,
                index_name: "iso3",
                search_field: "nameShortEn",
                llm: &self.llm,
                question: &question,
            };
            if let Some(partner) = resolver
                .resolve(
                    extraction.partner_name.as_deref(),
                    extraction.partner_code_guess.as_deref(),
                )
                .await?
            {
                resolved.insert("partner_id".into(), partner["countryId"].clone());
                resolved.insert(
                    "partner_name".into(),
                    partner
                        .get("nameShortEn")
                        .cloned()
                        .unwrap_or_else(|| json!(extraction.partner_name)),
                );
            }
        }

        if extraction.mentions_product() {
            let resolver = EntityResolver {
                cache: &self.product_catalog,
                index_name: "code",
                search_field: "nameShortEn",
                llm: &self.llm,
                question: &question,
            };
            let mut product = resolver
                .resolve(
                    extraction.product_name.as_deref(),
                    extraction.product_code_guess.as_deref(),
                )
                .await?;
            // Goods miss: retry in the services catalog by name.
            if product.is_none() {
                let services = EntityResolver {
                    cache: &self.services_catalog,
                    index_name: "name",
                    search_field: "nameShortEn",
                    llm: &self.llm,
                    question: &question,
                };
                product = services
                    .resolve(
                        extraction.product_name.as_deref(),
                        extraction.product_code_guess.as_deref(),
                    )
                    .await?;
            }
            if let Some(product) = product {
                resolved.insert("product_id".into(), product["productId"].clone());
                resolved.insert(
                    "product_name".into(),
                    product
                        .get("nameShortEn")
                        .cloned()
                        .unwrap_or_else(|| json!(extraction.product_name)),
                );
            } else {
                resolution_notes.push(format!(
                    "Could not resolve product '{}' in catalog",
                    extraction
                        .product_name
                        .as_deref()
                        .or(extraction.product_code_guess.as_deref())
                        .unwrap_or_default()
                ));
            }
        }

        if !resolution_notes.is_empty() {
            resolved.insert("resolution_notes".into(), json!(resolution_notes));
        }

        // Pass-through scalars.
        if let Some(year) = extraction.year {
            resolved.insert("year".into(), json!(year));
        }
        if let Some(year_min) = extraction.year_min {
            resolved.insert("year_min".into(), json!(year_min));
        }
        if let Some(year_max) = extraction.year_max {
            resolved.insert("year_max".into(), json!(year_max));
        }
        if let Some(lookback) = extraction.lookback_years {
            resolved.insert("lookback_years".into(), json!(lookback));
        }
        if let Some(level) = extraction.product_level {
            resolved.insert("product_level".into(), serde_json::to_value(level).unwrap_or(Value::Null));
        }
        if let Some(class) = extraction.product_class {
            resolved.insert("product_class".into(), json!(class.as_str()));
        }
        if let Some(group_name) = &extraction.group_name {
            resolved.insert("group_name".into(), json!(group_name));
        }
        if let Some(group_type) = &extraction.group_type {
            resolved.insert("group_type".into(), json!(group_type));
        }

        // Links are built from canonical numeric ids, before API formatting.
        let resolved = Value::Object(resolved);
        state.graphql_atlas_links = generate_atlas_links(classification.query_type, &resolved);
        state.graphql_resolved_params = Some(format_ids_for_api(&resolved, api_target));
        Ok(state)
    }
}

/// Builds the query for the classified type and executes it against the
/// routed endpoint. Never raises: failures land in `last_error`.
pub struct BuildAndExecuteGraphql {
    explore: Arc<dyn GraphQLExecutor>,
    country_pages: Option<Arc<dyn GraphQLExecutor>>,
}

impl BuildAndExecuteGraphql {
    pub fn new(
        explore: Arc<dyn GraphQLExecutor>,
        country_pages: Option<Arc<dyn GraphQLExecutor>>,
    ) -> Self {
        Self {
            explore,
            country_pages,
        }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for BuildAndExecuteGraphql {
    fn id(&self) -> &str {
        "build_and_execute_graphql"
    }

    async fn run(&self, state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let ctx = RunContext::new(Default::default());
        self.run_with_context(state, &ctx).await
    }

    async fn run_with_context(
        &self,
        mut state: AtlasAgentState,
        ctx: &RunContext<AtlasAgentState>,
    ) -> Result<AtlasAgentState, AgentError> {
        let classification = state.graphql_classification.clone();
        let resolved = state.graphql_resolved_params.clone();

        let (Some(classification), Some(resolved)) = (classification, resolved) else {
            state.graphql_raw_response = None;
            state.graphql_query = None;
            state.graphql_execution_time_ms = 0;
            state.last_error.clear();
            return Ok(state);
        };
        if classification.query_type == QueryType::Reject {
            state.graphql_raw_response = None;
            state.graphql_query = None;
            state.graphql_execution_time_ms = 0;
            state.last_error.clear();
            return Ok(state);
        }

        let api_target = classification
            .api_target
            .or(state.graphql_api_target)
            .unwrap_or(ApiTarget::Explore);
        let client = match (api_target, &self.country_pages) {
            (ApiTarget::CountryPages, Some(pages)) => Arc::clone(pages),
            _ => Arc::clone(&self.explore),
        };

        let (query, variables) = match build_graphql_query(classification.query_type, &resolved) {
            Ok(built) => built,
            Err(e) => {
                error!(error = %e, "failed to build GraphQL query");
                state.graphql_raw_response =
                    Some(json!({"error": "build_failed", "detail": e.to_string()}));
                state.graphql_query = None;
                state.graphql_execution_time_ms = 0;
                state.last_error = format!("Failed to build query: {e}");
                return Ok(state);
            }
        };

        let session_id = ctx.config.session_id.as_deref();
        let started = Instant::now();
        match client.execute(&query, variables, session_id).await {
            Ok(data) => {
                state.graphql_raw_response = Some(data);
                state.graphql_query = Some(query);
                state.graphql_execution_time_ms = started.elapsed().as_millis() as u64;
                state.last_error.clear();
            }
            Err(GraphQLClientError::BudgetExhausted) => {
                warn!("GraphQL budget exhausted");
                state.graphql_raw_response = Some(json!({
                    "error": "budget_exhausted",
                    "detail": "GraphQL API budget exhausted"
                }));
                state.graphql_query = Some(query);
                state.graphql_execution_time_ms = started.elapsed().as_millis() as u64;
                state.last_error = "GraphQL API budget exhausted".to_string();
            }
            Err(e) => {
                error!(error = %e, "GraphQL execution failed");
                state.graphql_raw_response =
                    Some(json!({"error": "graphql_error", "detail": e.to_string()}));
                state.graphql_query = Some(query);
                state.graphql_execution_time_ms = started.elapsed().as_millis() as u64;
                state.last_error = format!("GraphQL query failed: {e}");
            }
        }
        Ok(state)
    }
}

/// Turns the pipeline outcome into a tool message.
///
/// Four cases: rejection, extraction failure, execution failure (links
/// discarded), success (post-processed, links preserved).
pub struct FormatGraphqlResults {
    product_catalog: Option<Arc<CatalogCache>>,
    country_catalog: Option<Arc<CatalogCache>>,
}

impl FormatGraphqlResults {
    pub fn new(
        product_catalog: Option<Arc<CatalogCache>>,
        country_catalog: Option<Arc<CatalogCache>>,
    ) -> Self {
        Self {
            product_catalog,
            country_catalog,
        }
    }
}

#[async_trait]
impl Node<AtlasAgentState> for FormatGraphqlResults {
    fn id(&self) -> &str {
        "format_graphql_results"
    }

    async fn run(&self, mut state: AtlasAgentState) -> Result<AtlasAgentState, AgentError> {
        let tool_calls = state
            .last_message()
            .map(|m| m.tool_calls().to_vec())
            .unwrap_or_default();
        let Some(first) = tool_calls.first() else {
            return Err(AgentError::Graph(
                "format_graphql_results reached without a tool call".into(),
            ));
        };

        let classification = state.graphql_classification.clone();
        let query_type = classification.as_ref().map(|c| c.query_type);
        let raw_response = state.graphql_raw_response.clone();

        let mut atlas_links = Vec::new();
        let content = if query_type == Some(QueryType::Reject) {
            let reason = classification
                .as_ref()
                .and_then(|c| c.rejection_reason.clone())
                .unwrap_or_else(|| "Question not supported".to_string());
            format!(
                "This question could not be answered via the Atlas GraphQL API. Rejection reason: {reason}"
            )
        } else if classification.is_some() && state.graphql_entity_extraction.is_none() {
            "Entity extraction failed — could not parse entities from the question. Please try rephrasing your question."
                .to_string()
        } else if let Some(error_kind) = raw_response
            .as_ref()
            .and_then(|r| r.get("error"))
            .and_then(Value::as_str)
        {
            let detail = raw_response
                .as_ref()
                .and_then(|r| r.get("detail"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("Error executing GraphQL query: {error_kind} — {detail}")
        } else if !state.last_error.is_empty() || raw_response.is_none() {
            let cause = if state.last_error.is_empty() {
                "No response received"
            } else {
                state.last_error.as_str()
            };
            format!("Error executing GraphQL query: {cause}")
        } else {
            let processed = post_process_response(
                query_type.unwrap_or(QueryType::Reject),
                raw_response.as_ref().unwrap_or(&Value::Null),
                self.product_catalog.as_ref(),
                self.country_catalog.as_ref(),
            );
            atlas_links = state.graphql_atlas_links.clone();
            serde_json::to_string_pretty(&processed)
                .unwrap_or_else(|_| "Error serializing GraphQL response".to_string())
        };

        let mut messages = vec![Message::tool(content, &first.id, "atlas_graphql")];
        for tc in &tool_calls[1..] {
            messages.push(Message::tool(PARALLEL_CALL_STUB, &tc.id, "atlas_graphql"));
        }
        state.push_messages(messages);
        state.queries_executed += 1;
        state.graphql_atlas_links = atlas_links;
        Ok(state)
    }
}
