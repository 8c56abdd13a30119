//! Server-side post-processing of voluminous GraphQL responses.
//!
//! For the high-volume query types a rules entry declares the root key, the
//! sort field, the truncation bound, an enrichment source, and an optional
//! filter. The processed payload replaces the raw one before it reaches the
//! model.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::cache::CatalogCache;

use super::types::QueryType;

/// Which catalog supplies human-readable names for enrichment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnrichWith {
    Product,
    Country,
    None,
}

/// Optional row filter applied before sorting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowFilter {
    /// Keep rows where the export RCA is below 1 (feasibility candidates).
    RcaBelowOne,
}

impl RowFilter {
    fn keep(&self, item: &Value) -> bool {
        match self {
            RowFilter::RcaBelowOne => {
                item.get("exportRca").and_then(Value::as_f64).unwrap_or(0.0) < 1.0
            }
        }
    }
}

/// Post-processing rules for one query type.
#[derive(Clone, Debug)]
pub struct PostProcessRules {
    pub root_key: &'static str,
    pub sort_field: &'static str,
    pub top_n: usize,
    pub enrich: EnrichWith,
    pub filter: Option<RowFilter>,
}

/// Rules table. Query types not listed pass through untouched.
pub fn rules_for(query_type: QueryType) -> Option<PostProcessRules> {
    let rules = match query_type {
        QueryType::TreemapProducts
        | QueryType::OvertimeProducts
        | QueryType::Marketshare
        | QueryType::ProductTable => PostProcessRules {
            root_key: "countryProductYear",
            sort_field: "exportValue",
            top_n: 20,
            enrich: EnrichWith::Product,
            filter: None,
        },
        QueryType::ProductSpace => PostProcessRules {
            root_key: "countryProductYear",
            sort_field: "exportValue",
            top_n: 50,
            enrich: EnrichWith::Product,
            filter: None,
        },
        QueryType::Feasibility | QueryType::FeasibilityTable => PostProcessRules {
            root_key: "countryProductYear",
            sort_field: "cog",
            top_n: 20,
            enrich: EnrichWith::Product,
            filter: Some(RowFilter::RcaBelowOne),
        },
        QueryType::TreemapPartners
        | QueryType::OvertimePartners
        | QueryType::BilateralAggregate => PostProcessRules {
            root_key: "countryCountryYear",
            sort_field: "exportValue",
            top_n: 20,
            enrich: EnrichWith::Country,
            filter: None,
        },
        QueryType::TreemapBilateral | QueryType::ExploreBilateral => PostProcessRules {
            root_key: "countryCountryProductYear",
            sort_field: "exportValue",
            top_n: 20,
            enrich: EnrichWith::Product,
            filter: None,
        },
        QueryType::GrowthOpportunities => PostProcessRules {
            root_key: "productSpace",
            sort_field: "cog",
            top_n: 20,
            enrich: EnrichWith::None,
            filter: None,
        },
        _ => return None,
    };
    Some(rules)
}

/// Applies filter → sort (descending, nulls last) → truncate → enrich.
///
/// Responses at or under the bound pass through untouched, as do query types
/// with no rules entry. Enrichment uses synchronous catalog lookups and
/// skips with a warning when the catalog is not populated.
pub fn post_process_response(
    query_type: QueryType,
    raw_response: &Value,
    product_catalog: Option<&Arc<CatalogCache>>,
    country_catalog: Option<&Arc<CatalogCache>>,
) -> Value {
    let Some(rules) = rules_for(query_type) else {
        return raw_response.clone();
    };
    let Some(items) = raw_response.get(rules.root_key).and_then(Value::as_array) else {
        return raw_response.clone();
    };
    if items.len() <= rules.top_n {
        return raw_response.clone();
    }
    let total_items = items.len();

    let mut items: Vec<Value> = match rules.filter {
        Some(filter) => items.iter().filter(|i| filter.keep(i)).cloned().collect(),
        None => items.to_vec(),
    };

    // Descending by sort field, null values last.
    items.sort_by(|a, b| {
        let av = a.get(rules.sort_field).and_then(Value::as_f64);
        let bv = b.get(rules.sort_field).and_then(Value::as_f64);
        bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
    });
    items.truncate(rules.top_n);

    match rules.enrich {
        EnrichWith::Product => {
            if let Some(catalog) = product_catalog {
                if !catalog.is_populated() {
                    warn!(
                        query_type = query_type.as_str(),
                        "product catalog not populated — skipping enrichment"
                    );
                } else {
                    for item in &mut items {
                        let Some(pid) = item.get("productId").and_then(Value::as_i64) else {
                            continue;
                        };
                        if let Ok(Some(entry)) = catalog.lookup_sync("id", &pid.to_string()) {
                            item["productName"] =
                                entry.get("nameShortEn").cloned().unwrap_or(json!(""));
                            item["productCode"] = entry.get("code").cloned().unwrap_or(json!(""));
                        }
                    }
                }
            }
        }
        EnrichWith::Country => {
            if let Some(catalog) = country_catalog {
                if !catalog.is_populated() {
                    warn!(
                        query_type = query_type.as_str(),
                        "country catalog not populated — skipping enrichment"
                    );
                } else {
                    for item in &mut items {
                        let Some(cid) = item.get("partnerCountryId").and_then(Value::as_i64) else {
                            continue;
                        };
                        if let Ok(Some(entry)) = catalog.lookup_sync("id", &cid.to_string()) {
                            item["partnerName"] =
                                entry.get("nameShortEn").cloned().unwrap_or(json!(""));
                        }
                    }
                }
            }
        }
        EnrichWith::None => {}
    }

    json!({
        rules.root_key: items,
        "_postProcessed": {
            "totalItems": total_items,
            "shownItems": items.len(),
            "sortField": rules.sort_field,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn product_catalog() -> Arc<CatalogCache> {
        let catalog = Arc::new(CatalogCache::new("product_catalog", Duration::from_secs(60)));
        catalog.add_index(
            "id",
            Arc::new(|e: &Value| e.get("productId").map(|v| v.to_string())),
            Arc::new(|q: &str| q.trim().to_string()),
        );
        catalog.populate(vec![
            json!({"productId": 1, "code": "5201", "nameShortEn": "Cotton"}),
            json!({"productId": 2, "code": "1001", "nameShortEn": "Wheat"}),
        ]);
        catalog
    }

    fn response_with_items(n: usize) -> Value {
        let items: Vec<Value> = (0..n)
            .map(|i| json!({"productId": (i % 2) + 1, "exportValue": i as f64, "exportRca": 0.5}))
            .collect();
        json!({ "countryProductYear": items })
    }

    /// **Scenario**: responses over the bound are sorted descending,
    /// truncated to topN, and enriched with names.
    #[test]
    fn sorts_truncates_enriches() {
        let catalog = product_catalog();
        let out = post_process_response(
            QueryType::TreemapProducts,
            &response_with_items(50),
            Some(&catalog),
            None,
        );
        let items = out["countryProductYear"].as_array().unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(items[0]["exportValue"], 49.0);
        assert!(items[0]["productName"].is_string());
        assert_eq!(out["_postProcessed"]["totalItems"], 50);
        assert_eq!(out["_postProcessed"]["shownItems"], 20);
        assert_eq!(out["_postProcessed"]["sortField"], "exportValue");
    }

    /// **Scenario**: |output| ≤ topN and ≤ |input| for every ruled type.
    #[test]
    fn output_bounds_hold() {
        let catalog = product_catalog();
        for qt in QueryType::ALL {
            let Some(rules) = rules_for(qt) else { continue };
            let raw = json!({ rules.root_key: (0..(rules.top_n * 2))
                .map(|i| json!({"productId": 1, "partnerCountryId": 1, rules.sort_field: i as f64, "exportRca": 0.1}))
                .collect::<Vec<_>>() });
            let out = post_process_response(qt, &raw, Some(&catalog), Some(&catalog));
            let shown = out[rules.root_key].as_array().unwrap().len();
            assert!(shown <= rules.top_n);
            assert!(shown <= rules.top_n * 2);
        }
    }

    /// **Scenario**: small responses pass through untouched.
    #[test]
    fn small_responses_untouched() {
        let raw = response_with_items(5);
        let out = post_process_response(QueryType::TreemapProducts, &raw, None, None);
        assert_eq!(out, raw);
        assert!(out.get("_postProcessed").is_none());
    }

    /// **Scenario**: the feasibility filter drops rows with RCA ≥ 1.
    #[test]
    fn feasibility_filters_rca() {
        let items: Vec<Value> = (0..30)
            .map(|i| json!({"productId": 1, "cog": i as f64, "exportRca": if i % 2 == 0 { 0.4 } else { 1.5 }}))
            .collect();
        let raw = json!({ "countryProductYear": items });
        let out = post_process_response(QueryType::Feasibility, &raw, None, None);
        let shown = out["countryProductYear"].as_array().unwrap();
        assert_eq!(shown.len(), 15);
        assert!(shown
            .iter()
            .all(|i| i["exportRca"].as_f64().unwrap() < 1.0));
    }

    /// **Scenario**: null sort values sort last.
    #[test]
    fn nulls_sort_last() {
        let mut items: Vec<Value> = (0..25)
            .map(|i| json!({"productId": 1, "exportValue": i as f64}))
            .collect();
        items.push(json!({"productId": 2, "exportValue": null}));
        let raw = json!({ "countryProductYear": items });
        let out = post_process_response(QueryType::TreemapProducts, &raw, None, None);
        let shown = out["countryProductYear"].as_array().unwrap();
        assert!(shown.iter().all(|i| !i["exportValue"].is_null()));
    }

    /// **Scenario**: an unpopulated catalog skips enrichment without failing.
    #[test]
    fn unpopulated_catalog_skips_enrichment() {
        let empty = Arc::new(CatalogCache::new("product_catalog", Duration::from_secs(60)));
        let out = post_process_response(
            QueryType::TreemapProducts,
            &response_with_items(30),
            Some(&empty),
            None,
        );
        let items = out["countryProductYear"].as_array().unwrap();
        assert_eq!(items.len(), 20);
        assert!(items[0].get("productName").is_none());
    }
}
