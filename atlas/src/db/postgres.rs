//! Postgres implementation of [`TradeDb`] over a read-only pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use serde_json::{json, Value};
use tokio_postgres::types::Type;
use tokio_postgres::{NoTls, Row};
use tracing::warn;

use super::{schema_products_table, DbError, ProductRow, QueryOutput, TradeDb};

/// Read-only connection pool against the trade database.
///
/// Every connection sets `default_transaction_read_only = on`, so a generated
/// statement can never write regardless of what the model produced.
pub struct PostgresDb {
    pool: Pool,
}

impl PostgresDb {
    pub fn new(database_url: &str, connect_timeout: Duration, pool_size: usize) -> Result<Self, DbError> {
        let mut config = tokio_postgres::Config::from_str(database_url)
            .map_err(|e| DbError::Permanent(format!("invalid database url: {e}")))?;
        config.options("-c default_transaction_read_only=on");
        config.connect_timeout(connect_timeout);

        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .map_err(|e| DbError::Permanent(format!("pool build failed: {e}")))?;
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, DbError> {
        self.pool
            .get()
            .await
            .map_err(|e| DbError::Transient(format!("pool: {e}")))
    }

    fn classify(e: tokio_postgres::Error) -> DbError {
        if e.is_closed() || e.to_string().contains("timed out") {
            DbError::Transient(e.to_string())
        } else {
            // SQL errors (syntax, unknown relation) come back with a DbError
            // code attached; everything else without one is transport-level.
            match e.code() {
                Some(_) => DbError::Permanent(e.to_string()),
                None => DbError::Transient(e.to_string()),
            }
        }
    }

    fn cell_to_value(row: &Row, idx: usize) -> Value {
        let column_type = row.columns()[idx].type_();
        let result = if *column_type == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
        } else if *column_type == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
        } else if *column_type == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
        } else if *column_type == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
        } else if *column_type == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)
                .map(|v| v.map(|f| json!(f)).unwrap_or(Value::Null))
        } else if *column_type == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)
                .map(|v| v.map(|f| json!(f)).unwrap_or(Value::Null))
        } else if *column_type == Type::JSON || *column_type == Type::JSONB {
            row.try_get::<_, Option<Value>>(idx)
                .map(|v| v.unwrap_or(Value::Null))
        } else if *column_type == Type::DATE {
            row.try_get::<_, Option<chrono::NaiveDate>>(idx)
                .map(|v| v.map(|d| Value::from(d.to_string())).unwrap_or(Value::Null))
        } else if *column_type == Type::TIMESTAMP {
            row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
                .map(|v| v.map(|d| Value::from(d.to_string())).unwrap_or(Value::Null))
        } else if *column_type == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
                .map(|v| v.map(|d| Value::from(d.to_rfc3339())).unwrap_or(Value::Null))
        } else {
            row.try_get::<_, Option<String>>(idx)
                .map(|v| v.map(Value::from).unwrap_or(Value::Null))
        };
        result.unwrap_or_else(|e| {
            warn!(column = idx, error = %e, "unmapped column type, emitting null");
            Value::Null
        })
    }

    fn rows_to_output(rows: Vec<Row>) -> QueryOutput {
        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let data = rows
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|idx| Self::cell_to_value(row, idx))
                    .collect()
            })
            .collect();
        QueryOutput {
            columns,
            rows: data,
        }
    }

    fn row_to_product(row: &Row) -> ProductRow {
        let get = |idx: usize| -> String {
            match Self::cell_to_value(row, idx) {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            }
        };
        ProductRow {
            product_code: get(0),
            product_name: get(1),
            product_id: get(2),
            product_level: get(3),
        }
    }
}

#[async_trait]
impl TradeDb for PostgresDb {
    async fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        let client = self.client().await?;
        let rows = client.query(sql, &[]).await.map_err(Self::classify)?;
        Ok(Self::rows_to_output(rows))
    }

    async fn table_ddl(&self, table_names: &[String]) -> Result<String, DbError> {
        let client = self.client().await?;
        let mut ddl = String::new();
        for qualified in table_names {
            let Some((schema, table)) = qualified.split_once('.') else {
                continue;
            };
            let rows = client
                .query(
                    "SELECT column_name, data_type FROM information_schema.columns
                     WHERE table_schema = $1 AND table_name = $2
                     ORDER BY ordinal_position",
                    &[&schema, &table],
                )
                .await
                .map_err(Self::classify)?;
            if rows.is_empty() {
                continue;
            }
            ddl.push_str(&format!("CREATE TABLE {qualified} (\n"));
            let cols: Vec<String> = rows
                .iter()
                .map(|row| {
                    let name: String = row.get(0);
                    let data_type: String = row.get(1);
                    format!("    {name} {data_type}")
                })
                .collect();
            ddl.push_str(&cols.join(",\n"));
            ddl.push_str("\n);\n");
        }
        Ok(ddl)
    }

    async fn product_details(
        &self,
        codes: &[String],
        schema: &str,
    ) -> Result<Vec<ProductRow>, DbError> {
        let table = schema_products_table(schema)
            .ok_or_else(|| DbError::Permanent(format!("unknown schema '{schema}'")))?;
        let client = self.client().await?;
        let sql = format!(
            "SELECT DISTINCT code AS product_code, name_short_en AS product_name,
                    product_id::text, product_level::text
             FROM {table} WHERE code = ANY($1)"
        );
        let rows = client
            .query(&sql, &[&codes.to_vec()])
            .await
            .map_err(Self::classify)?;
        Ok(rows.iter().map(Self::row_to_product).collect())
    }

    async fn text_search(&self, term: &str, schema: &str) -> Result<Vec<ProductRow>, DbError> {
        let table = schema_products_table(schema)
            .ok_or_else(|| DbError::Permanent(format!("unknown schema '{schema}'")))?;
        let client = self.client().await?;

        let ts_sql = format!(
            "SELECT DISTINCT code AS product_code, name_short_en AS product_name,
                    product_id::text, product_level::text,
                    ts_rank_cd(to_tsvector('english', name_short_en),
                               plainto_tsquery('english', $1)) AS rank
             FROM {table}
             WHERE to_tsvector('english', name_short_en) @@ plainto_tsquery('english', $1)
             ORDER BY rank DESC LIMIT 5"
        );
        let rows = client.query(&ts_sql, &[&term]).await.map_err(Self::classify)?;
        if !rows.is_empty() {
            return Ok(rows.iter().map(Self::row_to_product).collect());
        }

        // Trigram fallback when full text finds nothing.
        let fuzzy_sql = format!(
            "SELECT DISTINCT code AS product_code, name_short_en AS product_name,
                    product_id::text, product_level::text,
                    similarity(LOWER(name_short_en), LOWER($1)) AS sim
             FROM {table}
             WHERE similarity(LOWER(name_short_en), LOWER($1)) > 0.3
             ORDER BY sim DESC LIMIT 5"
        );
        let rows = client
            .query(&fuzzy_sql, &[&term])
            .await
            .map_err(Self::classify)?;
        Ok(rows.iter().map(Self::row_to_product).collect())
    }
}
