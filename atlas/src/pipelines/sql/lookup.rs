//! Product and schema lookup: analyze a trade question for the schemas it
//! needs and resolve mentioned products to classification codes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::cache::{keys, CacheRegistry, TtlCache};
use crate::db::{DbError, ProductRow, TradeDb};
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::message::Message;

pub const PRODUCT_DETAILS_MAXSIZE: usize = 512;
pub const PRODUCT_DETAILS_TTL: Duration = Duration::from_secs(86_400);
pub const TEXT_SEARCH_MAXSIZE: usize = 1024;
pub const TEXT_SEARCH_TTL: Duration = Duration::from_secs(21_600);

/// A country mentioned in the user query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CountryDetails {
    pub name: String,
    pub iso3_code: String,
}

/// A product mention with its candidate codes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub name: String,
    pub classification_schema: String,
    #[serde(default)]
    pub codes: Vec<String>,
}

/// Schemas, products, and countries found in a trade question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemasAndProducts {
    #[serde(default)]
    pub classification_schemas: Vec<String>,
    #[serde(default)]
    pub products: Vec<ProductDetails>,
    #[serde(default)]
    pub requires_product_lookup: bool,
    #[serde(default)]
    pub countries: Vec<CountryDetails>,
}

/// Final product-name → code mapping chosen by the model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCodesMapping {
    #[serde(default)]
    pub mappings: Vec<ProductDetails>,
}

/// Candidate codes for one product, from LLM verification and DB search.
#[derive(Clone, Debug)]
pub struct ProductSearchResult {
    pub name: String,
    pub classification_schema: String,
    pub llm_suggestions: Vec<ProductRow>,
    pub db_suggestions: Vec<ProductRow>,
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are an assistant for a text-to-sql system that uses a database of international trade data.

Analyze the user's question about trade data to determine which database schemas are needed and what product codes should be looked up.

Available schemas in the postgres db:
- hs92: Trade data for goods, in HS 1992 product classification
- hs12: Trade data for goods, in HS 2012 product classification
- sitc: Trade data for goods, in SITC product classification
- services_unilateral: Trade data for services products with exporter-product-year data. Use this schema if the user asks about services data for a specific country.
- services_bilateral: Trade data for services products with exporter-importer-product-year data. Use this schema if the user asks about services trade between two specific countries.

Guidelines for schema selection:
- For questions without a specified product classification, default to 'hs92' for goods; use 'services_bilateral' for services trade between specific countries and 'services_unilateral' for services trade of a single country.
- Only include services schemas if services are explicitly mentioned.
- Include specific product classifications if mentioned (e.g. "HS 2012" implies schema 'hs12').
- Never return more than two schemas unless explicitly required.

Guidelines for product identification:
- "Products" is how trade data is classified; product groups like "machinery" count. Be liberal with identifying products: goods, services, or a mix.
- Only identify products that don't already have codes specified in the question.
- Suggest codes at the level most specific to the product mentioned; include multiple codes for broad categories.

Guidelines for country identification:
- Identify all countries mentioned, with common name and ISO 3166-1 alpha-3 code.
- Regions or continents are NOT countries."#;

const SELECTION_SYSTEM_PROMPT: &str = r#"Select the most appropriate product code for each product name based on the context of the user's question and the candidate codes.

Choose the most accurate match for the specific context. Include only products that have clear matches; exclude products that are too ambiguous or have no good candidates. If no candidates are relevant to a product, return an empty mapping for that product."#;

fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "classification_schemas": {
                "type": "array",
                "items": {"type": "string", "enum": ["hs92", "hs12", "sitc", "services_unilateral", "services_bilateral"]},
                "description": "Relevant schema names, based on the product classification systems implied in the question."
            },
            "products": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Product name as mentioned in the question."},
                        "classification_schema": {"type": "string", "description": "Schema this product's codes belong to."},
                        "codes": {"type": "array", "items": {"type": "string"}, "description": "Suggested product codes."}
                    },
                    "required": ["name", "classification_schema", "codes"]
                },
                "description": "Identified products and their candidate codes."
            },
            "requires_product_lookup": {
                "type": "boolean",
                "description": "Whether the question mentions products without codes that need a database lookup."
            },
            "countries": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "iso3_code": {"type": "string", "description": "ISO 3166-1 alpha-3 code."}
                    },
                    "required": ["name", "iso3_code"]
                },
                "description": "Countries mentioned in the question."
            }
        },
        "required": ["classification_schemas", "products", "requires_product_lookup"]
    })
}

fn selection_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "mappings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "classification_schema": {"type": "string"},
                        "codes": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name", "classification_schema", "codes"]
                },
                "description": "Final mapping of product names to selected codes."
            }
        },
        "required": ["mappings"]
    })
}

/// Product/schema analysis bound to an LLM, the trade DB, and the per-query
/// caches.
pub struct ProductAndSchemaLookup {
    llm: Arc<dyn LlmClient>,
    db: Arc<dyn TradeDb>,
    product_details_cache: Arc<TtlCache<String, Value>>,
    text_search_cache: Arc<TtlCache<String, Value>>,
    registry: Arc<CacheRegistry>,
}

impl ProductAndSchemaLookup {
    pub fn new(llm: Arc<dyn LlmClient>, db: Arc<dyn TradeDb>, registry: Arc<CacheRegistry>) -> Self {
        let product_details_cache =
            registry.create("product_details", PRODUCT_DETAILS_MAXSIZE, PRODUCT_DETAILS_TTL);
        let text_search_cache =
            registry.create("text_search", TEXT_SEARCH_MAXSIZE, TEXT_SEARCH_TTL);
        Self {
            llm,
            db,
            product_details_cache,
            text_search_cache,
            registry,
        }
    }

    /// Structured extraction of schemas, products, and countries.
    pub async fn extract(&self, question: &str) -> Result<SchemasAndProducts, AgentError> {
        let messages = [
            Message::system(EXTRACTION_SYSTEM_PROMPT),
            Message::human(question),
        ];
        let value = self
            .llm
            .invoke_structured(&messages, "schemas_and_products", &extraction_schema())
            .await?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::StructuredOutput(format!("schemas_and_products: {e}")))
    }

    /// Candidate codes for each product: verified LLM suggestions plus DB
    /// text search, both TTL-cached with order-insensitive keys.
    pub async fn candidate_codes(
        &self,
        products: &SchemasAndProducts,
    ) -> Result<Vec<ProductSearchResult>, AgentError> {
        let mut results = Vec::new();
        for product in &products.products {
            let llm_suggestions = self
                .cached_product_details(&product.codes, &product.classification_schema)
                .await?;
            let db_suggestions = self
                .cached_text_search(&product.name, &product.classification_schema)
                .await?;
            results.push(ProductSearchResult {
                name: product.name.clone(),
                classification_schema: product.classification_schema.clone(),
                llm_suggestions,
                db_suggestions,
            });
        }
        Ok(results)
    }

    async fn cached_product_details(
        &self,
        codes: &[String],
        schema: &str,
    ) -> Result<Vec<ProductRow>, AgentError> {
        if codes.is_empty() {
            return Ok(vec![]);
        }
        let key = keys::product_details_key(codes, schema);
        if let Some(cached) = self.product_details_cache.get(&key) {
            self.registry.record_hit("product_details");
            return Ok(serde_json::from_value(cached).unwrap_or_default());
        }
        self.registry.record_miss("product_details");
        let rows = match self.db.product_details(codes, schema).await {
            Ok(rows) => rows,
            Err(DbError::Permanent(e)) => {
                error!(error = %e, "database error during code verification");
                vec![]
            }
            Err(e) => return Err(e.into()),
        };
        self.product_details_cache
            .insert(key, serde_json::to_value(&rows).unwrap_or(Value::Null));
        Ok(rows)
    }

    async fn cached_text_search(
        &self,
        term: &str,
        schema: &str,
    ) -> Result<Vec<ProductRow>, AgentError> {
        let key = keys::text_search_key(term, schema);
        if let Some(cached) = self.text_search_cache.get(&key) {
            self.registry.record_hit("text_search");
            return Ok(serde_json::from_value(cached).unwrap_or_default());
        }
        self.registry.record_miss("text_search");
        let rows = match self.db.text_search(term, schema).await {
            Ok(rows) => rows,
            Err(DbError::Permanent(e)) => {
                error!(error = %e, "database error during text search");
                vec![]
            }
            Err(e) => return Err(e.into()),
        };
        self.text_search_cache
            .insert(key, serde_json::to_value(&rows).unwrap_or(Value::Null));
        Ok(rows)
    }

    /// Asks the model to pick the final code set from the combined candidates.
    pub async fn select_final_codes(
        &self,
        question: &str,
        candidates: &[ProductSearchResult],
    ) -> Result<ProductCodesMapping, AgentError> {
        if candidates.is_empty() {
            return Ok(ProductCodesMapping::default());
        }

        let rendered: String = candidates
            .iter()
            .map(|result| {
                let options: String = result
                    .llm_suggestions
                    .iter()
                    .chain(&result.db_suggestions)
                    .map(|s| format!("- {}: {}\n", s.product_code, s.product_name))
                    .collect();
                format!(
                    "Product to search for: {}\nProduct classification system to use: {}\nCandidate matches:\n{options}",
                    result.name, result.classification_schema
                )
            })
            .collect();

        let messages = [
            Message::system(SELECTION_SYSTEM_PROMPT),
            Message::human(format!(
                "Question: {question}\n\nSearch results for each product:\n{rendered}\n\nReturn the final mapping of product names to product codes."
            )),
        ];
        let value = self
            .llm
            .invoke_structured(&messages, "product_codes_mapping", &selection_schema())
            .await?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::StructuredOutput(format!("product_codes_mapping: {e}")))
    }
}

/// Formats selected codes for the SQL generation prompt.
pub fn format_product_codes_for_prompt(mapping: &ProductCodesMapping) -> String {
    if mapping.mappings.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n");
    for product in &mapping.mappings {
        if product.codes.is_empty() {
            out.push_str(&format!(
                "- {} - There was an error looking up the product codes for this product. Ask the user to specify the product codes and the classification system manually.\n",
                product.name
            ));
        } else {
            out.push_str(&format!(
                "- {} (Schema: {}): {}\n",
                product.name,
                product.classification_schema,
                product.codes.join(", ")
            ));
        }
    }
    out
}
