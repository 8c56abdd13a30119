//! Entity resolution: extracted names/codes → catalog ids.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::CatalogCache;
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::message::Message;

use super::types::ApiTarget;

/// Resolves one entity against a catalog.
///
/// Step A: exact lookup on the code index using the model's guess.
/// Step B: name-based substring search (limit 5), deduplicated against A.
/// Step C: single candidate → accept; exact case-insensitive name match →
/// accept; otherwise ask the model to pick by 1-based index, falling back to
/// the first candidate.
pub struct EntityResolver<'a> {
    pub cache: &'a Arc<CatalogCache>,
    pub index_name: &'a str,
    pub search_field: &'a str,
    pub llm: &'a Arc<dyn LlmClient>,
    pub question: &'a str,
}

impl EntityResolver<'_> {
    pub async fn resolve(
        &self,
        name: Option<&str>,
        code_guess: Option<&str>,
    ) -> Result<Option<Value>, AgentError> {
        let mut candidates: Vec<Value> = Vec::new();

        if let Some(code) = code_guess {
            if let Some(entry) = self.cache.lookup(self.index_name, code).await? {
                candidates.push(entry);
            }
        }

        if let Some(name) = name {
            let results = self.cache.search(self.search_field, name, 5).await?;
            for entry in results {
                if !candidates.contains(&entry) {
                    candidates.push(entry);
                }
            }
        }

        if candidates.is_empty() {
            return Ok(None);
        }
        if candidates.len() == 1 {
            return Ok(candidates.into_iter().next());
        }

        // Exact name match wins without a model call.
        if let Some(name) = name {
            let needle = name.trim().to_lowercase();
            if let Some(hit) = candidates.iter().find(|c| {
                c.get(self.search_field)
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_lowercase() == needle)
                    .unwrap_or(false)
            }) {
                return Ok(Some(hit.clone()));
            }
        }

        match self.pick_with_model(&candidates).await {
            Some(index) if index < candidates.len() => Ok(Some(candidates[index].clone())),
            _ => {
                debug!("entity selection fell back to the first candidate");
                Ok(candidates.into_iter().next())
            }
        }
    }

    async fn pick_with_model(&self, candidates: &[Value]) -> Option<usize> {
        let options: String = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let label = c
                    .get(self.search_field)
                    .or_else(|| c.get("nameShortEn"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let code = c
                    .get("code")
                    .or_else(|| c.get("iso3Code"))
                    .and_then(Value::as_str)
                    .unwrap_or("N/A");
                format!("{}. {label} (code: {code})\n", i + 1)
            })
            .collect();
        let prompt = format!(
            "Question: {question}\n\nWhich of these {count} entries best matches the question? \
             Answer with the number only.\n{options}",
            question = self.question,
            count = candidates.len(),
        );
        let response = self
            .llm
            .invoke(&[Message::human(prompt)], &[])
            .await
            .ok()?;
        let index: usize = response.content.trim().parse().ok()?;
        index.checked_sub(1)
    }
}

/// Extracts the numeric id from a possibly-prefixed catalog value
/// (`76`, `"country-76"`, `"product-HS-726"`).
pub fn strip_id_prefix(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let s = value.as_str()?;
    if let Some((_, tail)) = s.rsplit_once('-') {
        if let Ok(n) = tail.parse() {
            return Some(n);
        }
    }
    s.parse().ok()
}

/// Formats resolved ids for the chosen endpoint.
///
/// Explore takes bare integers (`countryId: 404`); country pages take
/// prefixed strings (`location: "location-404"`,
/// `product: "product-HS-726"`), with the numeric keys removed.
pub fn format_ids_for_api(params: &Value, api_target: ApiTarget) -> Value {
    let mut result: Map<String, Value> = params.as_object().cloned().unwrap_or_default();

    match api_target {
        ApiTarget::CountryPages => {
            if let Some(country_id) = result.remove("country_id").as_ref().and_then(strip_id_prefix)
            {
                result.insert("location".into(), Value::from(format!("location-{country_id}")));
            }
            if let Some(product_id) = result.remove("product_id").as_ref().and_then(strip_id_prefix)
            {
                result.insert(
                    "product".into(),
                    Value::from(format!("product-HS-{product_id}")),
                );
            }
            if let Some(partner_id) = result.remove("partner_id").as_ref().and_then(strip_id_prefix)
            {
                result.insert("partner".into(), Value::from(format!("location-{partner_id}")));
            }
        }
        ApiTarget::Explore => {
            for key in ["country_id", "product_id", "partner_id"] {
                if let Some(value) = result.get(key) {
                    if let Some(n) = strip_id_prefix(value) {
                        result.insert(key.to_string(), Value::from(n));
                    }
                }
            }
        }
    }
    Value::Object(result)
}
