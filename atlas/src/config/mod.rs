//! Typed application configuration and the closed override vocabularies.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Agent operating mode: which tools get bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// GRAPHQL_SQL while budget is available, SQL_ONLY otherwise.
    Auto,
    /// SQL + GraphQL + docs.
    GraphqlSql,
    /// SQL + docs only.
    SqlOnly,
    /// GraphQL + docs only.
    GraphqlOnly,
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "graphql_sql" => Ok(Self::GraphqlSql),
            "sql_only" => Ok(Self::SqlOnly),
            "graphql_only" => Ok(Self::GraphqlOnly),
            _ => Err(format!(
                "unknown agent mode: {s} (use auto, graphql_sql, sql_only, or graphql_only)"
            )),
        }
    }
}

/// Classification schema override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSchema {
    Hs92,
    Hs12,
    Sitc,
}

impl TradeSchema {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSchema::Hs92 => "hs92",
            TradeSchema::Hs12 => "hs12",
            TradeSchema::Sitc => "sitc",
        }
    }
}

impl FromStr for TradeSchema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hs92" => Ok(Self::Hs92),
            "hs12" => Ok(Self::Hs12),
            "sitc" => Ok(Self::Sitc),
            _ => Err(format!("unknown schema: {s} (use hs92, hs12, or sitc)")),
        }
    }
}

/// Trade direction override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Exports,
    Imports,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Exports => "exports",
            TradeDirection::Imports => "imports",
        }
    }
}

impl FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exports" => Ok(Self::Exports),
            "imports" => Ok(Self::Imports),
            _ => Err(format!("unknown direction: {s} (use exports or imports)")),
        }
    }
}

/// Trade mode override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Goods,
    Services,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Goods => "goods",
            TradeMode::Services => "services",
        }
    }
}

impl FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "goods" => Ok(Self::Goods),
            "services" => Ok(Self::Services),
            _ => Err(format!("unknown mode: {s} (use goods or services)")),
        }
    }
}

/// Application configuration, read from the environment at bootstrap.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub explore_api_url: String,
    pub country_pages_api_url: String,

    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,

    pub graphql_max_retries: u32,
    pub graphql_backoff_base: Duration,
    pub graphql_timeout: Duration,

    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout: Duration,

    pub max_tool_uses: u32,
    pub top_k_per_query: usize,
    pub agent_mode: AgentMode,
    pub request_timeout: Duration,

    pub model: String,
    pub lightweight_model: String,

    pub db_connect_timeout: Duration,
    pub db_pool_size: usize,

    /// SQLite path for checkpoints + conversations; in-memory stores when unset.
    pub store_path: Option<String>,
    /// Optional JSON file replacing the built-in few-shot example queries.
    pub example_queries_path: Option<String>,

    pub listen_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            explore_api_url: "https://atlas.hks.harvard.edu/api/graphql".to_string(),
            country_pages_api_url: "https://atlas.hks.harvard.edu/api/countries/graphql"
                .to_string(),
            rate_limit_max_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            graphql_max_retries: 3,
            graphql_backoff_base: Duration::from_secs(1),
            graphql_timeout: Duration::from_secs(10),
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: Duration::from_secs(30),
            max_tool_uses: 3,
            top_k_per_query: 15,
            agent_mode: AgentMode::Auto,
            request_timeout: Duration::from_secs(120),
            model: "gpt-4o".to_string(),
            lightweight_model: "gpt-4o-mini".to_string(),
            db_connect_timeout: Duration::from_secs(10),
            db_pool_size: 8,
            store_path: None,
            example_queries_path: None,
            listen_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<f64>(key).map(Duration::from_secs_f64)
}

impl AppConfig {
    /// Reads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("ATLAS_DB_URL").ok(),
            explore_api_url: std::env::var("ATLAS_EXPLORE_API_URL")
                .unwrap_or(defaults.explore_api_url),
            country_pages_api_url: std::env::var("ATLAS_COUNTRY_PAGES_API_URL")
                .unwrap_or(defaults.country_pages_api_url),
            rate_limit_max_requests: env_parse("ATLAS_RATE_LIMIT_MAX_REQUESTS")
                .unwrap_or(defaults.rate_limit_max_requests),
            rate_limit_window: env_secs("ATLAS_RATE_LIMIT_WINDOW_SECONDS")
                .unwrap_or(defaults.rate_limit_window),
            graphql_max_retries: env_parse("ATLAS_GRAPHQL_MAX_RETRIES")
                .unwrap_or(defaults.graphql_max_retries),
            graphql_backoff_base: env_secs("ATLAS_GRAPHQL_BACKOFF_BASE_SECONDS")
                .unwrap_or(defaults.graphql_backoff_base),
            graphql_timeout: env_secs("ATLAS_GRAPHQL_TIMEOUT_SECONDS")
                .unwrap_or(defaults.graphql_timeout),
            circuit_failure_threshold: env_parse("ATLAS_CIRCUIT_FAILURE_THRESHOLD")
                .unwrap_or(defaults.circuit_failure_threshold),
            circuit_recovery_timeout: env_secs("ATLAS_CIRCUIT_RECOVERY_SECONDS")
                .unwrap_or(defaults.circuit_recovery_timeout),
            max_tool_uses: env_parse("ATLAS_MAX_TOOL_USES").unwrap_or(defaults.max_tool_uses),
            top_k_per_query: env_parse("ATLAS_TOP_K_PER_QUERY").unwrap_or(defaults.top_k_per_query),
            agent_mode: std::env::var("ATLAS_AGENT_MODE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.agent_mode),
            request_timeout: env_secs("ATLAS_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout),
            model: std::env::var("ATLAS_MODEL").unwrap_or(defaults.model),
            lightweight_model: std::env::var("ATLAS_LIGHTWEIGHT_MODEL")
                .unwrap_or(defaults.lightweight_model),
            db_connect_timeout: env_secs("ATLAS_DB_CONNECT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.db_connect_timeout),
            db_pool_size: env_parse("ATLAS_DB_POOL_SIZE").unwrap_or(defaults.db_pool_size),
            store_path: std::env::var("ATLAS_STORE_PATH").ok(),
            example_queries_path: std::env::var("ATLAS_EXAMPLE_QUERIES_PATH").ok(),
            listen_addr: std::env::var("ATLAS_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: override enums parse their closed vocabularies and
    /// reject anything else.
    #[test]
    fn override_enums_closed() {
        assert_eq!("hs12".parse::<TradeSchema>().unwrap(), TradeSchema::Hs12);
        assert!("hs22".parse::<TradeSchema>().is_err());
        assert_eq!(
            "imports".parse::<TradeDirection>().unwrap(),
            TradeDirection::Imports
        );
        assert!("reexports".parse::<TradeDirection>().is_err());
        assert_eq!("services".parse::<TradeMode>().unwrap(), TradeMode::Services);
        assert!("both".parse::<TradeMode>().is_err());
    }

    /// **Scenario**: agent modes parse case-insensitively.
    #[test]
    fn agent_mode_parses() {
        assert_eq!("AUTO".parse::<AgentMode>().unwrap(), AgentMode::Auto);
        assert_eq!(
            "graphql_sql".parse::<AgentMode>().unwrap(),
            AgentMode::GraphqlSql
        );
        assert!("hybrid".parse::<AgentMode>().is_err());
    }
}
