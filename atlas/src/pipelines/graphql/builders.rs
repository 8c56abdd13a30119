//! GraphQL query builders, dispatched by [`QueryType`].
//!
//! High-volume query types use slim builders that request only the sort and
//! display fields the post-processor needs; the rest use full-field
//! builders. The dispatch is an exhaustive match; `Reject` reaching it is a
//! programming error surfaced as such.

use serde_json::{json, Map, Value};

use crate::error::AgentError;

use super::types::QueryType;

fn get_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

fn get_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn product_level_int(params: &Value) -> i64 {
    match params.get("product_level") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(4),
        Some(Value::String(s)) => match s.as_str() {
            "section" => 1,
            "twoDigit" => 2,
            "sixDigit" => 6,
            _ => 4,
        },
        _ => 4,
    }
}

fn product_class(params: &Value) -> String {
    get_str(params, "product_class").unwrap_or("HS92").to_string()
}

/// Fills yearMin/yearMax: a single `year` pins both, otherwise the range
/// defaults to the latest data year.
fn apply_year_bounds(variables: &mut Map<String, Value>, params: &Value) {
    if let Some(year) = get_i64(params, "year") {
        variables.insert("yearMin".into(), json!(year));
        variables.insert("yearMax".into(), json!(year));
    } else {
        variables.insert(
            "yearMin".into(),
            json!(get_i64(params, "year_min").unwrap_or(2024)),
        );
        variables.insert(
            "yearMax".into(),
            json!(get_i64(params, "year_max").unwrap_or(2024)),
        );
    }
}

// -- explore builders --------------------------------------------------------

fn country_product_year(params: &Value, fields: &str) -> (String, Value) {
    let mut variables = Map::new();
    variables.insert("countryId".into(), json!(get_i64(params, "country_id")));
    variables.insert("productLevel".into(), json!(product_level_int(params)));
    variables.insert("productClass".into(), json!(product_class(params)));
    apply_year_bounds(&mut variables, params);
    if let Some(product_id) = get_i64(params, "product_id") {
        variables.insert("productId".into(), json!(product_id));
    }
    let query = format!(
        "query CPY($countryId: Int, $productLevel: Int!, $productClass: ProductClass,\n\
         \x20         $productId: Int, $yearMin: Int, $yearMax: Int) {{\n\
         \x20 countryProductYear(\n\
         \x20   countryId: $countryId\n\
         \x20   productLevel: $productLevel\n\
         \x20   productClass: $productClass\n\
         \x20   productId: $productId\n\
         \x20   yearMin: $yearMin\n\
         \x20   yearMax: $yearMax\n\
         \x20 ) {{\n\
         \x20   {fields}\n\
         \x20 }}\n\
         }}"
    );
    (query, Value::Object(variables))
}

const CPY_FULL_FIELDS: &str = "countryId productId productLevel year \
    exportValue importValue globalMarketShare \
    exportRca exportRpop isNew productStatus cog distance \
    normalizedPci normalizedCog normalizedDistance normalizedExportRca";

const CPY_TREEMAP_FIELDS: &str = "productId year exportValue";

const CPY_FEASIBILITY_FIELDS: &str = "productId year exportValue exportRca cog distance";

fn country_country_year(params: &Value, fields: &str) -> (String, Value) {
    let mut variables = Map::new();
    variables.insert("countryId".into(), json!(get_i64(params, "country_id")));
    apply_year_bounds(&mut variables, params);
    if let Some(partner_id) = get_i64(params, "partner_id") {
        variables.insert("partnerCountryId".into(), json!(partner_id));
    }
    let query = format!(
        "query CCY($countryId: Int, $partnerCountryId: Int, $yearMin: Int, $yearMax: Int) {{\n\
         \x20 countryCountryYear(\n\
         \x20   countryId: $countryId\n\
         \x20   partnerCountryId: $partnerCountryId\n\
         \x20   yearMin: $yearMin\n\
         \x20   yearMax: $yearMax\n\
         \x20 ) {{\n\
         \x20   {fields}\n\
         \x20 }}\n\
         }}"
    );
    (query, Value::Object(variables))
}

const CCY_FULL_FIELDS: &str = "countryId partnerCountryId year \
    exportValue importValue exportValueReported importValueReported";

const CCY_TREEMAP_FIELDS: &str = "countryId partnerCountryId year exportValue importValue";

fn country_country_product_year(params: &Value, fields: &str) -> (String, Value) {
    let mut variables = Map::new();
    variables.insert("countryId".into(), json!(get_i64(params, "country_id")));
    variables.insert(
        "partnerCountryId".into(),
        json!(get_i64(params, "partner_id")),
    );
    variables.insert("productLevel".into(), json!(product_level_int(params)));
    variables.insert("productClass".into(), json!(product_class(params)));
    apply_year_bounds(&mut variables, params);
    let query = format!(
        "query CCPY($countryId: Int, $partnerCountryId: Int,\n\
         \x20          $productLevel: Int!, $productClass: ProductClass,\n\
         \x20          $yearMin: Int, $yearMax: Int) {{\n\
         \x20 countryCountryProductYear(\n\
         \x20   countryId: $countryId\n\
         \x20   partnerCountryId: $partnerCountryId\n\
         \x20   productLevel: $productLevel\n\
         \x20   productClass: $productClass\n\
         \x20   yearMin: $yearMin\n\
         \x20   yearMax: $yearMax\n\
         \x20 ) {{\n\
         \x20   {fields}\n\
         \x20 }}\n\
         }}"
    );
    (query, Value::Object(variables))
}

const CCPY_FULL_FIELDS: &str =
    "countryId partnerCountryId productId productLevel year exportValue importValue";

const CCPY_TREEMAP_FIELDS: &str = "productId year exportValue";

fn country_year(params: &Value) -> (String, Value) {
    let mut variables = Map::new();
    variables.insert("countryId".into(), json!(get_i64(params, "country_id")));
    apply_year_bounds(&mut variables, params);
    let query = "query CY($countryId: Int, $yearMin: Int, $yearMax: Int) {\n\
         \x20 countryYear(countryId: $countryId, yearMin: $yearMin, yearMax: $yearMax) {\n\
         \x20   countryId year exportValue importValue\n\
         \x20   population gdp gdppc gdpPpp gdppcPpp\n\
         \x20   gdpConst gdpPppConst gdppcConst gdppcPppConst\n\
         \x20   eci eciFixed coi currentAccount growthProj\n\
         \x20 }\n\
         }"
    .to_string();
    (query, Value::Object(variables))
}

fn product_year(params: &Value) -> (String, Value) {
    let mut variables = Map::new();
    variables.insert("productId".into(), json!(get_i64(params, "product_id")));
    variables.insert("productLevel".into(), json!(product_level_int(params)));
    apply_year_bounds(&mut variables, params);
    let query = "query PY($productId: Int, $productLevel: Int!, $yearMin: Int, $yearMax: Int) {\n\
         \x20 productYear(productId: $productId, productLevel: $productLevel, yearMin: $yearMin, yearMax: $yearMax) {\n\
         \x20   productId productLevel year exportValue importValue\n\
         \x20   exportValueConstGrowth5 importValueConstGrowth5\n\
         \x20   exportValueConstCagr5 importValueConstCagr5\n\
         \x20   pci complexityEnum\n\
         \x20 }\n\
         }"
    .to_string();
    (query, Value::Object(variables))
}

fn group_year(params: &Value) -> (String, Value) {
    let mut variables = Map::new();
    if let Some(group_id) = get_i64(params, "group_id") {
        variables.insert("groupId".into(), json!(group_id));
    }
    if let Some(group_type) = get_str(params, "group_type") {
        variables.insert("groupType".into(), json!(group_type));
    }
    apply_year_bounds(&mut variables, params);
    let query = "query GY($groupId: Int, $groupType: GroupType, $yearMin: Int, $yearMax: Int) {\n\
         \x20 groupYear(groupId: $groupId, groupType: $groupType, yearMin: $yearMin, yearMax: $yearMax) {\n\
         \x20   groupId year exportValue importValue population gdp gdpPpp\n\
         \x20 }\n\
         }"
    .to_string();
    (query, Value::Object(variables))
}

fn data_availability() -> (String, Value) {
    let query = "query {\n\
         \x20 dataAvailability {\n\
         \x20   productClassification yearMin yearMax\n\
         \x20 }\n\
         }"
    .to_string();
    (query, json!({}))
}

// -- country-pages builders --------------------------------------------------

fn lookback_range(years: i64) -> Option<&'static str> {
    match years {
        3 => Some("ThreeYears"),
        5 => Some("FiveYears"),
        10 => Some("TenYears"),
        15 => Some("FifteenYears"),
        _ => None,
    }
}

fn country_profile(params: &Value) -> (String, Value) {
    let location = get_str(params, "location").unwrap_or_default();
    let query = "query CP($location: ID!) {\n\
         \x20 countryProfile(location: $location) {\n\
         \x20   location { id shortName }\n\
         \x20   latestPopulation { quantity year }\n\
         \x20   latestGdp { quantity year }\n\
         \x20   latestGdpRank { quantity year }\n\
         \x20   latestGdpPpp { quantity year }\n\
         \x20   latestGdpPerCapita { quantity year }\n\
         \x20   latestGdpPerCapitaRank { quantity year }\n\
         \x20   incomeClassification\n\
         \x20   exportValue importValue exportValueRank\n\
         \x20   exportValueNatResources importValueNatResources\n\
         \x20   latestEci latestEciRank\n\
         \x20   latestCoi latestCoiRank coiClassification\n\
         \x20   growthProjection growthProjectionRank\n\
         \x20   growthProjectionClassification\n\
         \x20   growthProjectionRelativeToIncome\n\
         \x20   diversificationGrade diversityRank diversity\n\
         \x20   currentAccount { quantity year }\n\
         \x20 }\n\
         }"
    .to_string();
    (query, json!({ "location": location }))
}

fn country_lookback(params: &Value) -> (String, Value) {
    let location = get_str(params, "location").unwrap_or_default();
    let mut variables = Map::new();
    variables.insert("id".into(), json!(location));
    if let Some(range) = get_i64(params, "lookback_years").and_then(lookback_range) {
        variables.insert("yearRange".into(), json!(range));
    }
    let query = "query CL($id: ID!, $yearRange: LookBackYearRange) {\n\
         \x20 countryLookback(id: $id, yearRange: $yearRange) {\n\
         \x20   id eciRankChange eciChange\n\
         \x20   exportValueConstGrowthCagr\n\
         \x20   exportValueGrowthNonOilConstCagr\n\
         \x20   diversityRankChange diversityChange\n\
         \x20   exportValueGrowthClassification\n\
         \x20   gdpPcConstantCagrRegionalDifference\n\
         \x20   gdpChangeConstantCagr gdpPerCapitaChangeConstantCagr gdpGrowthConstant\n\
         \x20   largestContributingExportProduct { shortName code }\n\
         \x20 }\n\
         }"
    .to_string();
    (query, Value::Object(variables))
}

fn new_products(params: &Value) -> (String, Value) {
    let location = get_str(params, "location").unwrap_or_default();
    let year = get_i64(params, "year").unwrap_or(2024);
    let query = "query NP($location: ID!, $year: Int!) {\n\
         \x20 newProductsCountry(location: $location, year: $year) {\n\
         \x20   location { id shortName }\n\
         \x20   newProductExportValue newProductExportValuePerCapita\n\
         \x20 }\n\
         }"
    .to_string();
    (query, json!({ "location": location, "year": year }))
}

fn growth_opportunities(params: &Value) -> (String, Value) {
    let location = get_str(params, "location").unwrap_or_default();
    let mut variables = Map::new();
    variables.insert("location".into(), json!(location));
    variables.insert("productClass".into(), json!(product_class(params)));
    if let Some(year) = get_i64(params, "year") {
        variables.insert("year".into(), json!(year));
    }
    let query = "query GO($location: ID!, $productClass: ProductClass!, $year: Int) {\n\
         \x20 productSpace(location: $location, productClass: $productClass, year: $year) {\n\
         \x20   product { id shortName code }\n\
         \x20   exportValue exportRca cog cogRank distance distanceRank\n\
         \x20 }\n\
         }"
    .to_string();
    (query, Value::Object(variables))
}

fn global_datum() -> (String, Value) {
    let query = "query {\n\
         \x20 globalDatum {\n\
         \x20   globalExportValue\n\
         \x20   latestEciRankTotal latestCoiRankTotal\n\
         \x20   latestExporterRankTotal latestGdpRankTotal\n\
         \x20   latestGdpPppPerCapitaRankTotal latestDiversityRankTotal\n\
         \x20 }\n\
         }"
    .to_string();
    (query, json!({}))
}

/// Builds the query string and variables for a classified query type.
pub fn build_graphql_query(
    query_type: QueryType,
    params: &Value,
) -> Result<(String, Value), AgentError> {
    let built = match query_type {
        // Slim builders for high-volume responses.
        QueryType::TreemapProducts => country_product_year(params, CPY_TREEMAP_FIELDS),
        QueryType::TreemapPartners => country_country_year(params, CCY_TREEMAP_FIELDS),
        QueryType::TreemapBilateral => country_country_product_year(params, CCPY_TREEMAP_FIELDS),
        QueryType::Feasibility | QueryType::FeasibilityTable => {
            country_product_year(params, CPY_FEASIBILITY_FIELDS)
        }
        // Full-field explore builders.
        QueryType::OvertimeProducts
        | QueryType::Marketshare
        | QueryType::ProductSpace
        | QueryType::ProductTable => country_product_year(params, CPY_FULL_FIELDS),
        QueryType::OvertimePartners | QueryType::BilateralAggregate => {
            country_country_year(params, CCY_FULL_FIELDS)
        }
        QueryType::ExploreBilateral => country_country_product_year(params, CCPY_FULL_FIELDS),
        QueryType::CountryYear => country_year(params),
        QueryType::ProductInfo => product_year(params),
        QueryType::ExploreGroup => group_year(params),
        QueryType::ExploreDataAvailability => data_availability(),
        // Country-pages builders.
        QueryType::CountryProfile
        | QueryType::CountryProfileExports
        | QueryType::CountryProfileComplexity => country_profile(params),
        QueryType::CountryLookback => country_lookback(params),
        QueryType::NewProducts => new_products(params),
        QueryType::GrowthOpportunities => growth_opportunities(params),
        QueryType::GlobalDatum => global_datum(),
        QueryType::Reject => {
            return Err(AgentError::Graph(
                "build_graphql_query called for a rejected query".into(),
            ))
        }
    };
    Ok(built)
}
