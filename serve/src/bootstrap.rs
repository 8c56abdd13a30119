//! Composition root: configuration → trackers → HTTP clients → catalogs →
//! stores → graph → service.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use atlas::agent::build::{build_agent_graph, AgentGraphDeps};
use atlas::cache::{CacheRegistry, CatalogCache};
use atlas::config::AppConfig;
use atlas::db::{MockTradeDb, PostgresDb, TableDescriptions, TradeDb};
use atlas::graphql::{AtlasGraphQLClient, BudgetTracker, CircuitBreaker, GraphQLExecutor};
use atlas::llm::{ChatOpenAI, LlmClient};
use atlas::memory::{
    Checkpointer, ConversationStore, InMemoryConversationStore, MemorySaver,
    SqliteConversationStore, SqliteSaver,
};
use atlas::pipelines::sql::prompts::ExampleQuery;
use atlas::service::AtlasService;
use atlas::state::AtlasAgentState;

use crate::app::AppState;

/// 24 hours, matching the catalog source's publication cadence.
const CATALOG_TTL: std::time::Duration = std::time::Duration::from_secs(86_400);

/// Everything the server needs, built in dependency order.
pub struct ServiceHandles {
    pub service: Arc<AtlasService>,
    pub conversations: Arc<dyn ConversationStore>,
    pub registry: Arc<CacheRegistry>,
}

fn name_key(entry: &Value) -> Option<String> {
    entry
        .get("nameShortEn")
        .or_else(|| entry.get("nameEn"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn build_country_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("country_catalog", CATALOG_TTL));
    catalog.add_index(
        "iso3",
        Arc::new(|e: &Value| {
            e.get("iso3Code")
                .and_then(Value::as_str)
                .map(str::to_uppercase)
                .filter(|s| !s.is_empty())
        }),
        Arc::new(|q: &str| q.trim().to_uppercase()),
    );
    catalog.add_index("name", Arc::new(name_key), Arc::new(|q: &str| q.trim().to_lowercase()));
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("countryId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog
}

fn build_product_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("product_catalog", CATALOG_TTL));
    catalog.add_index(
        "code",
        Arc::new(|e: &Value| {
            e.get("code")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        }),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog.add_index("name", Arc::new(name_key), Arc::new(|q: &str| q.trim().to_lowercase()));
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("productId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog
}

fn build_services_catalog() -> Arc<CatalogCache> {
    let catalog = Arc::new(CatalogCache::new("services_catalog", CATALOG_TTL));
    catalog.add_index("name", Arc::new(name_key), Arc::new(|q: &str| q.trim().to_lowercase()));
    catalog.add_index(
        "id",
        Arc::new(|e: &Value| e.get("productId").map(|v| v.to_string())),
        Arc::new(|q: &str| q.trim().to_string()),
    );
    catalog
}

fn wire_catalog_fetcher(
    catalog: &CatalogCache,
    client: Arc<dyn GraphQLExecutor>,
    query: &'static str,
    root: &'static str,
) {
    catalog.set_fetcher(Arc::new(move || {
        let client = Arc::clone(&client);
        Box::pin(async move {
            let data = client
                .execute(query, Value::Null, None)
                .await
                .map_err(|e| atlas::cache::CacheError::Fetch(e.to_string()))?;
            Ok(data
                .get(root)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default())
        })
    }));
}

fn load_example_queries(config: &AppConfig) -> Option<Vec<ExampleQuery>> {
    let path = config.example_queries_path.as_ref()?;
    match std::fs::read_to_string(path).and_then(|raw| {
        serde_json::from_str::<Vec<ExampleQuery>>(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }) {
        Ok(queries) => {
            info!(count = queries.len(), path = %path, "loaded example queries");
            Some(queries)
        }
        Err(e) => {
            warn!(error = %e, path = %path, "failed to load example queries, using built-ins");
            None
        }
    }
}

/// Builds the full service stack from configuration.
pub async fn build_services(
    config: &AppConfig,
) -> Result<ServiceHandles, Box<dyn std::error::Error + Send + Sync>> {
    // Trackers first: one budget for the remote API family, one breaker per
    // upstream.
    let budget = Arc::new(BudgetTracker::new(
        config.rate_limit_max_requests,
        config.rate_limit_window,
    ));
    let explore_circuit = Arc::new(CircuitBreaker::new(
        config.circuit_failure_threshold,
        config.circuit_recovery_timeout,
    ));
    let pages_circuit = Arc::new(CircuitBreaker::new(
        config.circuit_failure_threshold,
        config.circuit_recovery_timeout,
    ));

    let explore_client: Arc<dyn GraphQLExecutor> = Arc::new(
        AtlasGraphQLClient::new(&config.explore_api_url, config.graphql_timeout)
            .with_retries(config.graphql_max_retries, config.graphql_backoff_base)
            .with_budget(Arc::clone(&budget))
            .with_circuit(explore_circuit),
    );
    let country_pages_client: Arc<dyn GraphQLExecutor> = Arc::new(
        AtlasGraphQLClient::new(&config.country_pages_api_url, config.graphql_timeout)
            .with_retries(config.graphql_max_retries, config.graphql_backoff_base)
            .with_budget(Arc::clone(&budget))
            .with_circuit(pages_circuit),
    );

    // Catalogs with fetchers wired against the explore endpoint.
    let registry = Arc::new(CacheRegistry::new());
    let country_catalog = build_country_catalog();
    let product_catalog = build_product_catalog();
    let services_catalog = build_services_catalog();
    wire_catalog_fetcher(
        &country_catalog,
        Arc::clone(&explore_client),
        "{ locationCountry { countryId iso3Code nameShortEn nameEn } }",
        "locationCountry",
    );
    wire_catalog_fetcher(
        &product_catalog,
        Arc::clone(&explore_client),
        "{ productHs92(productLevel: 4) { productId code nameShortEn nameEn } }",
        "productHs92",
    );
    wire_catalog_fetcher(
        &services_catalog,
        Arc::clone(&explore_client),
        "{ productHs92(servicesClass: unilateral) { productId nameShortEn nameEn } }",
        "productHs92",
    );
    registry.register_catalog(Arc::clone(&country_catalog));
    registry.register_catalog(Arc::clone(&product_catalog));
    registry.register_catalog(Arc::clone(&services_catalog));

    // Trade database: read-only Postgres pool, or the in-memory double when
    // no URL is configured (dev without a database).
    let db: Arc<dyn TradeDb> = match &config.database_url {
        Some(url) => Arc::new(PostgresDb::new(
            url,
            config.db_connect_timeout,
            config.db_pool_size,
        )?),
        None => {
            warn!("ATLAS_DB_URL not set — using the in-memory trade database double");
            Arc::new(MockTradeDb::new())
        }
    };

    // Persistence.
    let (checkpointer, conversations): (
        Arc<dyn Checkpointer<AtlasAgentState>>,
        Arc<dyn ConversationStore>,
    ) = match &config.store_path {
        Some(path) => {
            let saver: SqliteSaver<AtlasAgentState> = SqliteSaver::new(path)?;
            (
                Arc::new(saver),
                Arc::new(SqliteConversationStore::new(path)?),
            )
        }
        None => {
            let saver: MemorySaver<AtlasAgentState> = MemorySaver::new();
            (
                Arc::new(saver),
                Arc::new(InMemoryConversationStore::new()),
            )
        }
    };

    // Models.
    let llm: Arc<dyn LlmClient> = Arc::new(ChatOpenAI::new(&config.model).with_temperature(0.0));
    let lightweight_llm: Arc<dyn LlmClient> =
        Arc::new(ChatOpenAI::new(&config.lightweight_model).with_temperature(0.0));

    let graph = build_agent_graph(AgentGraphDeps {
        llm,
        lightweight_llm,
        db,
        registry: Arc::clone(&registry),
        country_catalog,
        product_catalog,
        services_catalog,
        explore_client,
        country_pages_client: Some(country_pages_client),
        budget: Some(budget),
        table_descriptions: TableDescriptions::builtin(),
        example_queries: load_example_queries(config),
        agent_mode: config.agent_mode,
        max_uses: config.max_tool_uses,
        top_k: config.top_k_per_query,
        checkpointer: Some(checkpointer),
        nudge_enabled: true,
    })?;

    info!(mode = ?config.agent_mode, max_uses = config.max_tool_uses, "agent graph compiled");
    Ok(ServiceHandles {
        service: Arc::new(AtlasService::new(Arc::new(graph))),
        conversations,
        registry,
    })
}

/// Builds the axum state from the handles.
pub fn app_state(handles: ServiceHandles, config: &AppConfig) -> Arc<AppState> {
    Arc::new(AppState {
        service: Some(handles.service),
        conversations: handles.conversations,
        registry: handles.registry,
        request_timeout: config.request_timeout,
    })
}
