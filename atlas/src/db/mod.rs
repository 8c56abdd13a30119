//! Trade database access.
//!
//! [`TradeDb`] is the seam between the SQL pipeline and the relational
//! store: query execution, DDL reflection, and the two product-lookup
//! queries. [`PostgresDb`] is the production implementation (read-only
//! pool); [`MockTradeDb`] scripts results for tests.

mod descriptions;
mod mock;
mod postgres;

pub use descriptions::{TableDescription, TableDescriptions};
pub(crate) use descriptions::GROUP_AGGREGATE_MARKER;
pub use mock::MockTradeDb;
pub use postgres::PostgresDb;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Database error, classified for retry decisions.
#[derive(Debug, Error)]
pub enum DbError {
    /// Connection/pool/timeout failures; a retry may succeed.
    #[error("transient database error: {0}")]
    Transient(String),

    /// Bad SQL, unknown relation, permission denied; retrying is pointless.
    #[error("database error: {0}")]
    Permanent(String),
}

impl DbError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Transient(_))
    }
}

/// Result of one executed query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// Dict-per-row rendering handed to the model as the tool result.
    pub fn render(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let pairs: Vec<String> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| format!("'{c}': {v}"))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One product row from the classification tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub product_code: String,
    pub product_name: String,
    pub product_id: String,
    pub product_level: String,
}

/// The per-schema product classification lookup table.
pub fn schema_products_table(schema: &str) -> Option<&'static str> {
    match schema {
        "hs92" => Some("classification.product_hs92"),
        "hs12" => Some("classification.product_hs12"),
        "sitc" => Some("classification.product_sitc"),
        "services_unilateral" => Some("classification.product_services_unilateral"),
        "services_bilateral" => Some("classification.product_services_bilateral"),
        _ => None,
    }
}

/// Trade database seam.
#[async_trait]
pub trait TradeDb: Send + Sync {
    /// Executes a read-only query, returning columns and rows.
    async fn execute(&self, sql: &str) -> Result<QueryOutput, DbError>;

    /// DDL strings for the given schema-qualified tables.
    async fn table_ddl(&self, table_names: &[String]) -> Result<String, DbError>;

    /// Verifies LLM-suggested codes against the classification table.
    async fn product_details(
        &self,
        codes: &[String],
        schema: &str,
    ) -> Result<Vec<ProductRow>, DbError>;

    /// Full-text product-name search with trigram fallback.
    async fn text_search(&self, term: &str, schema: &str) -> Result<Vec<ProductRow>, DbError>;
}

/// Runs `op` with bounded backoff, retrying transient driver errors only.
pub async fn with_retry<T, F, Fut>(
    mut op: F,
    max_attempts: u32,
    backoff_base: Duration,
) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = backoff_base * 2u32.pow(attempt);
                warn!(attempt = attempt + 1, error = %e, "transient DB error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
