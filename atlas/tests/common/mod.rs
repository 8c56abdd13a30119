//! Shared fixtures: a fully mocked agent graph.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use atlas::agent::build::{build_agent_graph, AgentGraphDeps};
use atlas::cache::{CacheRegistry, CatalogCache};
use atlas::config::AgentMode;
use atlas::db::{MockTradeDb, ProductRow, QueryOutput};
use atlas::graph::CompiledStateGraph;
use atlas::graphql::{BudgetTracker, GraphQLClientError, GraphQLExecutor};
use atlas::llm::MockLlm;
use atlas::memory::{Checkpointer, MemorySaver};
use atlas::state::AtlasAgentState;
use atlas::TableDescriptions;

/// GraphQL executor with scripted responses (FIFO).
pub struct ScriptedGraphQL {
    responses: std::sync::Mutex<Vec<Result<Value, GraphQLClientError>>>,
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl ScriptedGraphQL {
    pub fn new(responses: Vec<Result<Value, GraphQLClientError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GraphQLExecutor for ScriptedGraphQL {
    async fn execute(
        &self,
        query: &str,
        _variables: Value,
        _session_id: Option<&str>,
    ) -> Result<Value, GraphQLClientError> {
        self.calls.lock().unwrap().push(query.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(GraphQLClientError::Permanent("script exhausted".into()));
        }
        responses.remove(0)
    }
}

pub fn populated_country_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("country_catalog", Duration::from_secs(600)));
    catalog.add_index(
        "iso3",
        Arc::new(|e: &Value| {
            e.get("iso3Code")
                .and_then(Value::as_str)
                .map(str::to_uppercase)
        }),
        Arc::new(|q: &str| q.trim().to_uppercase()),
    );
    catalog.add_index(
        "name",
        Arc::new(|e: &Value| {
            e.get("nameShortEn")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
        }),
        Arc::new(|q: &str| q.trim().to_lowercase()),
    );
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("countryId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.populate(vec![
        json!({"countryId": 76, "iso3Code": "BRA", "nameShortEn": "Brazil"}),
        json!({"countryId": 404, "iso3Code": "KEN", "nameShortEn": "Kenya"}),
        json!({"countryId": 840, "iso3Code": "USA", "nameShortEn": "United States"}),
    ]);
    catalog
}

pub fn populated_product_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("product_catalog", Duration::from_secs(600)));
    catalog.add_index(
        "code",
        Arc::new(|e: &Value| e.get("code").and_then(Value::as_str).map(str::to_string)),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.add_index(
        "name",
        Arc::new(|e: &Value| {
            e.get("nameShortEn")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
        }),
        Arc::new(|q: &str| q.trim().to_lowercase()),
    );
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("productId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.populate(vec![
        json!({"productId": 650, "code": "5201", "nameShortEn": "Cotton"}),
        json!({"productId": 726, "code": "0901", "nameShortEn": "Coffee"}),
    ]);
    catalog
}

pub fn empty_services_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("services_catalog", Duration::from_secs(600)));
    catalog.add_index(
        "name",
        Arc::new(|e: &Value| {
            e.get("nameShortEn")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_lowercase())
        }),
        Arc::new(|q: &str| q.trim().to_lowercase()),
    );
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("productId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.populate(vec![]);
    catalog
}

pub fn mock_db_with_results() -> Arc<MockTradeDb> {
    let db = Arc::new(MockTradeDb::new());
    db.set_products(
        "hs92",
        vec![ProductRow {
            product_code: "5201".into(),
            product_name: "Cotton, not carded or combed".into(),
            product_id: "650".into(),
            product_level: "4".into(),
        }],
    );
    db.set_ddl(
        "hs92.country_product_year_4",
        "CREATE TABLE hs92.country_product_year_4 (\n    country_id integer,\n    product_id integer,\n    year integer,\n    export_value numeric\n);",
    );
    db.push_query_result(Ok(QueryOutput {
        columns: vec!["product".into(), "export_value".into()],
        rows: vec![
            vec![json!("Soybeans"), json!(28_000_000_000i64)],
            vec![json!("Iron ore"), json!(25_000_000_000i64)],
        ],
    }));
    db
}

pub struct Fixture {
    pub llm: Arc<MockLlm>,
    pub lightweight: Arc<MockLlm>,
    pub db: Arc<MockTradeDb>,
    pub graphql: Arc<ScriptedGraphQL>,
    pub budget: Arc<BudgetTracker>,
    pub checkpointer: Arc<MemorySaver<AtlasAgentState>>,
    pub graph: Arc<CompiledStateGraph<AtlasAgentState>>,
}

pub struct FixtureOptions {
    pub agent_mode: AgentMode,
    pub max_uses: u32,
    pub nudge_enabled: bool,
    pub graphql_responses: Vec<Result<Value, GraphQLClientError>>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            agent_mode: AgentMode::GraphqlSql,
            max_uses: 3,
            nudge_enabled: false,
            graphql_responses: vec![],
        }
    }
}

pub fn build_fixture(options: FixtureOptions) -> Fixture {
    let llm = Arc::new(MockLlm::new());
    let lightweight = Arc::new(MockLlm::new());
    let db = mock_db_with_results();
    let graphql = Arc::new(ScriptedGraphQL::new(options.graphql_responses));
    let budget = Arc::new(BudgetTracker::new(100, Duration::from_secs(60)));
    let checkpointer = Arc::new(MemorySaver::<AtlasAgentState>::new());

    let graph = build_agent_graph(AgentGraphDeps {
        llm: llm.clone(),
        lightweight_llm: lightweight.clone(),
        db: db.clone(),
        registry: Arc::new(CacheRegistry::new()),
        country_catalog: populated_country_catalog(),
        product_catalog: populated_product_catalog(),
        services_catalog: empty_services_catalog(),
        explore_client: graphql.clone(),
        country_pages_client: None,
        budget: Some(budget.clone()),
        table_descriptions: TableDescriptions::builtin(),
        example_queries: None,
        agent_mode: options.agent_mode,
        max_uses: options.max_uses,
        top_k: 15,
        checkpointer: Some(checkpointer.clone() as Arc<dyn Checkpointer<AtlasAgentState>>),
        nudge_enabled: options.nudge_enabled,
    })
    .expect("graph compiles");

    Fixture {
        llm,
        lightweight,
        db,
        graphql,
        budget,
        checkpointer,
        graph: Arc::new(graph),
    }
}

/// Scripts the lightweight model for a full SQL pipeline pass.
pub fn script_sql_pipeline(fixture: &Fixture) {
    // extract_products
    fixture.lightweight.push_structured(json!({
        "classification_schemas": ["hs92"],
        "products": [],
        "requires_product_lookup": false,
        "countries": [{"name": "Brazil", "iso3_code": "BRA"}]
    }));
    // lookup_codes is skipped when no products were found; generate_sql uses
    // the frontier model.
}
