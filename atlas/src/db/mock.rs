//! Scripted in-memory [`TradeDb`] for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DbError, ProductRow, QueryOutput, TradeDb};

/// Test double: queued query results, canned DDL per table, and canned
/// product rows per (schema) for the lookup queries.
#[derive(Default)]
pub struct MockTradeDb {
    query_results: Mutex<Vec<Result<QueryOutput, DbError>>>,
    ddl: Mutex<HashMap<String, String>>,
    products: Mutex<HashMap<String, Vec<ProductRow>>>,
    pub executed: Mutex<Vec<String>>,
}

impl MockTradeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result for the next `execute` call (FIFO).
    pub fn push_query_result(&self, result: Result<QueryOutput, DbError>) {
        self.query_results.lock().unwrap().push(result);
    }

    pub fn set_ddl(&self, table: &str, ddl: &str) {
        self.ddl
            .lock()
            .unwrap()
            .insert(table.to_string(), ddl.to_string());
    }

    pub fn set_products(&self, schema: &str, rows: Vec<ProductRow>) {
        self.products
            .lock()
            .unwrap()
            .insert(schema.to_string(), rows);
    }
}

#[async_trait]
impl TradeDb for MockTradeDb {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        self.executed.lock().unwrap().push(sql.to_string());
        let mut results = self.query_results.lock().unwrap();
        if results.is_empty() {
            return Ok(QueryOutput::default());
        }
        results.remove(0)
    }

    async fn table_ddl(&self, table_names: &[String]) -> Result<String, DbError> {
        let ddl = self.ddl.lock().unwrap();
        let mut out = String::new();
        for name in table_names {
            match ddl.get(name) {
                Some(s) => {
                    out.push_str(s);
                    out.push('\n');
                }
                None => {
                    out.push_str(&format!("CREATE TABLE {name} (\n    year integer\n);\n"));
                }
            }
        }
        Ok(out)
    }

    async fn product_details(
        &self,
        codes: &[String],
        schema: &str,
    ) -> Result<Vec<ProductRow>, DbError> {
        Ok(self
            .products
            .lock()
            .unwrap()
            .get(schema)
            .map(|rows| {
                rows.iter()
                    .filter(|r| codes.contains(&r.product_code))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn text_search(&self, term: &str, schema: &str) -> Result<Vec<ProductRow>, DbError> {
        let needle = term.trim().to_lowercase();
        Ok(self
            .products
            .lock()
            .unwrap()
            .get(schema)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.product_name.to_lowercase().contains(&needle))
                    .take(5)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
