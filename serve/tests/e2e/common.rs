//! Spawns the server on an ephemeral port with a fully mocked service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use atlas::agent::build::{build_agent_graph, AgentGraphDeps};
use atlas::cache::{CacheRegistry, CatalogCache};
use atlas::config::AgentMode;
use atlas::db::{MockTradeDb, QueryOutput};
use atlas::graphql::{BudgetTracker, GraphQLClientError, GraphQLExecutor};
use atlas::llm::MockLlm;
use atlas::memory::{Checkpointer, InMemoryConversationStore, MemorySaver};
use atlas::service::AtlasService;
use atlas::state::AtlasAgentState;
use atlas::TableDescriptions;

use serve::AppState;

pub struct TestServer {
    pub base_url: String,
    pub llm: Arc<MockLlm>,
    pub lightweight: Arc<MockLlm>,
}

struct NoGraphQL;

#[async_trait::async_trait]
impl GraphQLExecutor for NoGraphQL {
    async fn execute(
        &self,
        _query: &str,
        _variables: Value,
        _session_id: Option<&str>,
    ) -> Result<Value, GraphQLClientError> {
        Err(GraphQLClientError::Permanent("no remote in tests".into()))
    }
}

fn catalog(name: &str) -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new(name, Duration::from_secs(600)));
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
        Arc::new(|e: &Value| {
            e.get("countryId")
                .or_else(|| e.get("productId"))
                .map(|v| v.to_string())
        }),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.populate(vec![
        json!({"countryId": 76, "iso3Code": "BRA", "nameShortEn": "Brazil"}),
    ]);
    catalog
}

/// Starts a server backed by mocks; returns its base URL and the scripted
/// models.
pub async fn spawn_server() -> TestServer {
    let llm = Arc::new(MockLlm::new());
    let lightweight = Arc::new(MockLlm::new());
    let db = Arc::new(MockTradeDb::new());
    db.push_query_result(Ok(QueryOutput {
        columns: vec!["product".into(), "export_value".into()],
        rows: vec![vec![json!("Soybeans"), json!(28_000_000_000i64)]],
    }));

    let graph = build_agent_graph(AgentGraphDeps {
        llm: llm.clone(),
        lightweight_llm: lightweight.clone(),
        db,
        registry: Arc::new(CacheRegistry::new()),
        country_catalog: catalog("country_catalog"),
        product_catalog: catalog("product_catalog"),
        services_catalog: catalog("services_catalog"),
        explore_client: Arc::new(NoGraphQL),
        country_pages_client: None,
        budget: Some(Arc::new(BudgetTracker::new(100, Duration::from_secs(60)))),
        table_descriptions: TableDescriptions::builtin(),
        example_queries: None,
        agent_mode: AgentMode::GraphqlSql,
        max_uses: 3,
        top_k: 15,
        checkpointer: Some(
            Arc::new(MemorySaver::<AtlasAgentState>::new())
                as Arc<dyn Checkpointer<AtlasAgentState>>,
        ),
        nudge_enabled: false,
    })
    .expect("graph compiles");

    let state = Arc::new(AppState {
        service: Some(Arc::new(AtlasService::new(Arc::new(graph)))),
        conversations: Arc::new(InMemoryConversationStore::new()),
        registry: Arc::new(CacheRegistry::new()),
        request_timeout: Duration::from_secs(30),
    });

    spawn_with_state(state, llm, lightweight).await
}

/// Starts a server with `service: None` to exercise the 503 path.
pub async fn spawn_unready_server() -> TestServer {
    let state = Arc::new(AppState {
        service: None,
        conversations: Arc::new(InMemoryConversationStore::new()),
        registry: Arc::new(CacheRegistry::new()),
        request_timeout: Duration::from_secs(30),
    });
    spawn_with_state(state, Arc::new(MockLlm::new()), Arc::new(MockLlm::new())).await
}

async fn spawn_with_state(
    state: Arc<AppState>,
    llm: Arc<MockLlm>,
    lightweight: Arc<MockLlm>,
) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve::run_serve_on_listener(listener, state).await;
    });
    TestServer {
        base_url: format!("http://{addr}"),
        llm,
        lightweight,
    }
}
