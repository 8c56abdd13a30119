//! Closed vocabularies and structured-output types for the GraphQL pipeline.
//!
//! `QueryType` is the dispatch key for both the query builders and the link
//! generator; keeping it a closed enum makes every dispatch an exhaustive
//! match.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AgentError;

/// Free-text fields from structured output are cut here to avoid
/// over-generation failures.
pub const MAX_REASONING_CHARS: usize = 300;

/// The closed set of GraphQL intents the classifier may choose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    CountryProfile,
    CountryProfileExports,
    CountryProfileComplexity,
    CountryLookback,
    NewProducts,
    TreemapProducts,
    TreemapPartners,
    TreemapBilateral,
    OvertimeProducts,
    OvertimePartners,
    Marketshare,
    ProductSpace,
    Feasibility,
    FeasibilityTable,
    GrowthOpportunities,
    ProductTable,
    CountryYear,
    ProductInfo,
    BilateralAggregate,
    ExploreBilateral,
    ExploreGroup,
    GlobalDatum,
    ExploreDataAvailability,
    Reject,
}

impl QueryType {
    pub const ALL: [QueryType; 24] = [
        QueryType::CountryProfile,
        QueryType::CountryProfileExports,
        QueryType::CountryProfileComplexity,
        QueryType::CountryLookback,
        QueryType::NewProducts,
        QueryType::TreemapProducts,
        QueryType::TreemapPartners,
        QueryType::TreemapBilateral,
        QueryType::OvertimeProducts,
        QueryType::OvertimePartners,
        QueryType::Marketshare,
        QueryType::ProductSpace,
        QueryType::Feasibility,
        QueryType::FeasibilityTable,
        QueryType::GrowthOpportunities,
        QueryType::ProductTable,
        QueryType::CountryYear,
        QueryType::ProductInfo,
        QueryType::BilateralAggregate,
        QueryType::ExploreBilateral,
        QueryType::ExploreGroup,
        QueryType::GlobalDatum,
        QueryType::ExploreDataAvailability,
        QueryType::Reject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::CountryProfile => "country_profile",
            QueryType::CountryProfileExports => "country_profile_exports",
            QueryType::CountryProfileComplexity => "country_profile_complexity",
            QueryType::CountryLookback => "country_lookback",
            QueryType::NewProducts => "new_products",
            QueryType::TreemapProducts => "treemap_products",
            QueryType::TreemapPartners => "treemap_partners",
            QueryType::TreemapBilateral => "treemap_bilateral",
            QueryType::OvertimeProducts => "overtime_products",
            QueryType::OvertimePartners => "overtime_partners",
            QueryType::Marketshare => "marketshare",
            QueryType::ProductSpace => "product_space",
            QueryType::Feasibility => "feasibility",
            QueryType::FeasibilityTable => "feasibility_table",
            QueryType::GrowthOpportunities => "growth_opportunities",
            QueryType::ProductTable => "product_table",
            QueryType::CountryYear => "country_year",
            QueryType::ProductInfo => "product_info",
            QueryType::BilateralAggregate => "bilateral_aggregate",
            QueryType::ExploreBilateral => "explore_bilateral",
            QueryType::ExploreGroup => "explore_group",
            QueryType::GlobalDatum => "global_datum",
            QueryType::ExploreDataAvailability => "explore_data_availability",
            QueryType::Reject => "reject",
        }
    }
}

/// Which remote endpoint serves a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiTarget {
    Explore,
    CountryPages,
}

/// Product aggregation level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProductLevel {
    Section,
    TwoDigit,
    FourDigit,
    SixDigit,
}

impl ProductLevel {
    /// Integer encoding used by the explore endpoint.
    pub fn as_int(&self) -> i64 {
        match self {
            ProductLevel::Section => 1,
            ProductLevel::TwoDigit => 2,
            ProductLevel::FourDigit => 4,
            ProductLevel::SixDigit => 6,
        }
    }
}

/// Product classification system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductClass {
    Hs92,
    Hs12,
    Hs22,
    Sitc,
}

impl ProductClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductClass::Hs92 => "HS92",
            ProductClass::Hs12 => "HS12",
            ProductClass::Hs22 => "HS22",
            ProductClass::Sitc => "SITC",
        }
    }
}

/// Classification of a user question for the remote API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryClassification {
    #[serde(default)]
    pub reasoning: String,
    pub query_type: QueryType,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub api_target: Option<ApiTarget>,
}

impl QueryClassification {
    /// Parses and normalizes a structured-output value.
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        let mut parsed: Self = serde_json::from_value(value)
            .map_err(|e| AgentError::StructuredOutput(format!("classification: {e}")))?;
        truncate_reasoning(&mut parsed.reasoning);
        Ok(parsed)
    }
}

/// Entities extracted from a user question.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityExtraction {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_code_guess: Option<String>,
    #[serde(default)]
    pub partner_name: Option<String>,
    #[serde(default)]
    pub partner_code_guess: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub product_code_guess: Option<String>,
    #[serde(default)]
    pub product_level: Option<ProductLevel>,
    #[serde(default)]
    pub product_class: Option<ProductClass>,
    #[serde(default)]
    pub year: Option<i64>,
    #[serde(default)]
    pub year_min: Option<i64>,
    #[serde(default)]
    pub year_max: Option<i64>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_type: Option<String>,
    #[serde(default)]
    pub lookback_years: Option<i64>,
}

impl EntityExtraction {
    pub fn from_value(value: Value) -> Result<Self, AgentError> {
        let mut parsed: Self = serde_json::from_value(value)
            .map_err(|e| AgentError::StructuredOutput(format!("entity extraction: {e}")))?;
        truncate_reasoning(&mut parsed.reasoning);
        Ok(parsed)
    }

    pub fn mentions_country(&self) -> bool {
        self.country_name.is_some() || self.country_code_guess.is_some()
    }

    pub fn mentions_partner(&self) -> bool {
        self.partner_name.is_some() || self.partner_code_guess.is_some()
    }

    pub fn mentions_product(&self) -> bool {
        self.product_name.is_some() || self.product_code_guess.is_some()
    }
}

fn truncate_reasoning(reasoning: &mut String) {
    if reasoning.chars().count() > MAX_REASONING_CHARS {
        let mut truncated: String = reasoning.chars().take(MAX_REASONING_CHARS - 3).collect();
        truncated.push_str("...");
        *reasoning = truncated;
    }
}

/// JSON schema for the classification call.
pub fn classification_schema() -> Value {
    let query_types: Vec<&str> = QueryType::ALL.iter().map(QueryType::as_str).collect();
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Step-by-step reasoning for the classification decision (max 300 chars)."
            },
            "query_type": {
                "type": "string",
                "enum": query_types,
                "description": "The query type that best answers the user's question; 'reject' when the question needs custom SQL aggregation, multi-table joins, or data the APIs do not carry."
            },
            "rejection_reason": {
                "type": ["string", "null"],
                "description": "Why the query was rejected. Only set when query_type is 'reject'."
            },
            "api_target": {
                "type": ["string", "null"],
                "enum": ["explore", "country_pages", null],
                "description": "explore: raw trade data, bilateral flows, time series, feasibility. country_pages: derived country profiles, lookback growth dynamics, new products, growth opportunities."
            }
        },
        "required": ["reasoning", "query_type"]
    })
}

/// JSON schema for the entity-extraction call.
pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reasoning": {
                "type": "string",
                "description": "Step-by-step reasoning for entity extraction decisions (max 300 chars)."
            },
            "country_name": {"type": ["string", "null"], "description": "Primary country mentioned in the question."},
            "country_code_guess": {"type": ["string", "null"], "description": "ISO 3166-1 alpha-3 code guess (e.g. 'KEN')."},
            "partner_name": {"type": ["string", "null"], "description": "Partner/destination country for bilateral queries."},
            "partner_code_guess": {"type": ["string", "null"], "description": "ISO3 code guess for the partner country."},
            "product_name": {"type": ["string", "null"], "description": "Product or commodity mentioned."},
            "product_code_guess": {"type": ["string", "null"], "description": "HS code guess (e.g. '0901' for coffee)."},
            "product_level": {
                "type": ["string", "null"],
                "enum": ["section", "twoDigit", "fourDigit", "sixDigit", null],
                "description": "Product aggregation level; fourDigit is the default and most common."
            },
            "product_class": {
                "type": ["string", "null"],
                "enum": ["HS92", "HS12", "HS22", "SITC", null],
                "description": "Product classification system; HS92 default, SITC for long historical series."
            },
            "year": {"type": ["integer", "null"], "description": "Specific year mentioned."},
            "year_min": {"type": ["integer", "null"], "description": "Start of time range for overtime queries."},
            "year_max": {"type": ["integer", "null"], "description": "End of time range for overtime queries."},
            "group_name": {"type": ["string", "null"], "description": "Country group name (e.g. 'ASEAN', 'EU')."},
            "group_type": {
                "type": ["string", "null"],
                "enum": ["continent", "region", "subregion", "trade", "wdi_income_level", "wdi_region", "political", "world", null],
                "description": "Group type for regional/group queries."
            },
            "lookback_years": {
                "type": ["integer", "null"],
                "enum": [3, 5, 10, 15, null],
                "description": "Lookback period in years for growth-dynamics questions."
            }
        },
        "required": ["reasoning"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: query types round-trip through their snake_case names.
    #[test]
    fn query_type_serde_roundtrip() {
        for qt in QueryType::ALL {
            let s = serde_json::to_string(&qt).unwrap();
            assert_eq!(s, format!("\"{}\"", qt.as_str()));
            let back: QueryType = serde_json::from_str(&s).unwrap();
            assert_eq!(back, qt);
        }
    }

    /// **Scenario**: over-long reasoning is truncated on parse.
    #[test]
    fn reasoning_truncated() {
        let value = json!({
            "reasoning": "x".repeat(500),
            "query_type": "treemap_products",
            "api_target": "explore"
        });
        let parsed = QueryClassification::from_value(value).unwrap();
        assert_eq!(parsed.reasoning.chars().count(), MAX_REASONING_CHARS);
        assert!(parsed.reasoning.ends_with("..."));
    }

    /// **Scenario**: unknown query types fail parsing (closed set).
    #[test]
    fn unknown_query_type_rejected() {
        let value = json!({"reasoning": "", "query_type": "heatmap"});
        assert!(QueryClassification::from_value(value).is_err());
    }

    /// **Scenario**: extraction tolerates missing fields.
    #[test]
    fn extraction_defaults() {
        let parsed = EntityExtraction::from_value(json!({"reasoning": "none"})).unwrap();
        assert!(!parsed.mentions_country());
        assert!(parsed.product_level.is_none());
    }

    /// **Scenario**: product levels map to the explore integer encoding.
    #[test]
    fn product_level_ints() {
        assert_eq!(ProductLevel::Section.as_int(), 1);
        assert_eq!(ProductLevel::FourDigit.as_int(), 4);
        let parsed: ProductLevel = serde_json::from_str("\"twoDigit\"").unwrap();
        assert_eq!(parsed, ProductLevel::TwoDigit);
    }
}
