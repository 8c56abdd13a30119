//! Deterministic URL builders for the presentation pages.
//!
//! Pure functions over resolved params: no LLM calls, no HTTP. Dispatch is
//! an exhaustive match on [`QueryType`], so adding a query type forces a
//! decision here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipelines::graphql::types::QueryType;

pub const ATLAS_BASE_URL: &str = "https://atlas.hks.harvard.edu";

/// Year defaults when the question does not specify.
pub const DEFAULT_YEAR: i64 = 2024;
pub const DEFAULT_START_YEAR: i64 = 1995;
pub const DEFAULT_PRODUCT_LEVEL: i64 = 4;

/// Countries whose country-page `growth-opportunities` and `product-table`
/// subpages do not exist; handlers substitute the explore feasibility pages.
pub const FRONTIER_COUNTRY_IDS: [i64; 17] = [
    40,  // Austria
    56,  // Belgium
    203, // Czech Republic
    208, // Denmark
    246, // Finland
    250, // France
    276, // Germany
    372, // Ireland
    380, // Italy
    392, // Japan
    410, // South Korea
    528, // Netherlands
    702, // Singapore
    752, // Sweden
    756, // Switzerland
    826, // United Kingdom
    840, // USA
];

/// Whether the presentation pages lack the country-page subpages.
pub fn is_frontier_country(country_id: i64) -> bool {
    FRONTIER_COUNTRY_IDS.contains(&country_id)
}

/// Which page surface a link points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    CountryPage,
    ExplorePage,
}

/// A deterministic link to a visualization page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtlasLink {
    pub url: String,
    pub label: String,
    pub link_type: LinkType,
    /// Human-readable notes when entities were ambiguously resolved.
    #[serde(default)]
    pub resolution_notes: Vec<String>,
}

// -- param accessors ---------------------------------------------------------

fn get_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

fn get_str<'a>(params: &'a Value, key: &'a str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn notes(params: &Value) -> Vec<String> {
    params
        .get("resolution_notes")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn year(params: &Value) -> i64 {
    get_i64(params, "year").unwrap_or(DEFAULT_YEAR)
}

/// `(year, start_year, end_year)` for time-series pages.
fn year_range(params: &Value) -> (i64, i64, i64) {
    let year_max = get_i64(params, "year_max").unwrap_or_else(|| year(params));
    let year_min = get_i64(params, "year_min").unwrap_or(DEFAULT_START_YEAR);
    (year_max, year_min, year_max)
}

fn country_name(params: &Value, country_id: i64) -> String {
    get_str(params, "country_name")
        .map(str::to_string)
        .unwrap_or_else(|| country_id.to_string())
}

// -- URL builders ------------------------------------------------------------

pub fn country_page_url(country_id: i64, subpage: Option<&str>) -> String {
    match subpage {
        Some(subpage) => format!("{ATLAS_BASE_URL}/countries/{country_id}/{subpage}"),
        None => format!("{ATLAS_BASE_URL}/countries/{country_id}"),
    }
}

pub struct TreemapParams {
    pub year: i64,
    pub country_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub product_classification: Option<String>,
    pub product_id: Option<i64>,
    pub view: Option<&'static str>,
    pub group_id: Option<i64>,
}

pub fn explore_treemap_url(p: &TreemapParams) -> String {
    let mut params = vec![format!("year={}", p.year)];
    if let Some(group_id) = p.group_id {
        params.push(format!("exporter=group-{group_id}"));
    } else if let Some(country_id) = p.country_id {
        params.push(format!("exporter=country-{country_id}"));
    }
    if let Some(partner_id) = p.partner_id {
        params.push(format!("importer=country-{partner_id}"));
    }
    if let (Some(classification), Some(product_id)) = (&p.product_classification, p.product_id) {
        params.push(format!(
            "product=product-{}-{product_id}",
            classification.to_uppercase()
        ));
    }
    if let Some(view) = p.view {
        params.push(format!("view={view}"));
    }
    format!("{ATLAS_BASE_URL}/explore/treemap?{}", params.join("&"))
}

pub fn explore_overtime_url(
    year: i64,
    start_year: i64,
    end_year: i64,
    country_id: i64,
    view: Option<&str>,
) -> String {
    let mut url = format!(
        "{ATLAS_BASE_URL}/explore/overtime?year={year}&startYear={start_year}&endYear={end_year}&exporter=country-{country_id}"
    );
    if let Some(view) = view {
        url.push_str(&format!("&view={view}"));
    }
    url
}

pub fn explore_marketshare_url(year: i64, start_year: i64, end_year: i64, country_id: i64) -> String {
    format!(
        "{ATLAS_BASE_URL}/explore/marketshare?year={year}&startYear={start_year}&endYear={end_year}&exporter=country-{country_id}"
    )
}

pub fn explore_productspace_url(year: i64, country_id: i64) -> String {
    format!("{ATLAS_BASE_URL}/explore/productspace?year={year}&exporter=country-{country_id}")
}

pub fn explore_feasibility_url(year: i64, country_id: i64) -> String {
    format!("{ATLAS_BASE_URL}/explore/feasibility?year={year}&exporter=country-{country_id}")
}

pub fn explore_feasibility_table_url(year: i64, country_id: i64, product_level: i64) -> String {
    format!(
        "{ATLAS_BASE_URL}/explore/feasibility/table?year={year}&exporter=country-{country_id}&productLevel={product_level}"
    )
}

// -- per-query-type handlers -------------------------------------------------

fn country_profile_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    vec![AtlasLink {
        url: country_page_url(cid, None),
        label: format!("{name} — Country Profile"),
        link_type: LinkType::CountryPage,
        resolution_notes: notes(params),
    }]
}

fn country_lookback_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let (year, start_year, end_year) = year_range(params);
    vec![
        AtlasLink {
            url: country_page_url(cid, Some("growth-dynamics")),
            label: format!("{name} — Growth Dynamics"),
            link_type: LinkType::CountryPage,
            resolution_notes: notes(params),
        },
        AtlasLink {
            url: explore_overtime_url(year, start_year, end_year, cid, None),
            label: format!("{name} — Trade Over Time ({start_year}–{end_year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
    ]
}

fn new_products_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    vec![AtlasLink {
        url: country_page_url(cid, Some("new-products")),
        label: format!("{name} — New Products"),
        link_type: LinkType::CountryPage,
        resolution_notes: notes(params),
    }]
}

fn treemap_products_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    vec![
        AtlasLink {
            url: explore_treemap_url(&TreemapParams {
                year,
                country_id: Some(cid),
                partner_id: None,
                product_classification: None,
                product_id: None,
                view: None,
                group_id: None,
            }),
            label: format!("{name} — Export Basket ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
        AtlasLink {
            url: country_page_url(cid, Some("export-basket")),
            label: format!("{name} — Export Basket"),
            link_type: LinkType::CountryPage,
            resolution_notes: notes(params),
        },
    ]
}

fn treemap_partners_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    vec![AtlasLink {
        url: explore_treemap_url(&TreemapParams {
            year,
            country_id: Some(cid),
            partner_id: None,
            product_classification: None,
            product_id: None,
            view: Some("markets"),
            group_id: None,
        }),
        label: format!("{name} — Trade Partners ({year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn bilateral_links(params: &Value) -> Vec<AtlasLink> {
    let (Some(cid), Some(pid)) = (get_i64(params, "country_id"), get_i64(params, "partner_id"))
    else {
        return vec![];
    };
    let name = country_name(params, cid);
    let partner = get_str(params, "partner_name")
        .map(str::to_string)
        .unwrap_or_else(|| pid.to_string());
    let year = year(params);
    vec![AtlasLink {
        url: explore_treemap_url(&TreemapParams {
            year,
            country_id: Some(cid),
            partner_id: Some(pid),
            product_classification: None,
            product_id: None,
            view: None,
            group_id: None,
        }),
        label: format!("{name} → {partner} ({year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn product_info_links(params: &Value) -> Vec<AtlasLink> {
    let Some(product_id) = get_i64(params, "product_id") else {
        return vec![];
    };
    let classification = get_str(params, "product_class").unwrap_or("HS92").to_string();
    let product_name = get_str(params, "product_name")
        .map(str::to_string)
        .unwrap_or_else(|| product_id.to_string());
    let year = year(params);
    vec![AtlasLink {
        url: explore_treemap_url(&TreemapParams {
            year,
            country_id: None,
            partner_id: None,
            product_classification: Some(classification),
            product_id: Some(product_id),
            view: None,
            group_id: None,
        }),
        label: format!("{product_name} — Global Trade ({year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn explore_group_links(params: &Value) -> Vec<AtlasLink> {
    let Some(gid) = get_i64(params, "group_id") else {
        return vec![];
    };
    let group_name = get_str(params, "group_name")
        .map(str::to_string)
        .unwrap_or_else(|| format!("Group {gid}"));
    let year = year(params);
    vec![AtlasLink {
        url: explore_treemap_url(&TreemapParams {
            year,
            country_id: None,
            partner_id: None,
            product_classification: None,
            product_id: None,
            view: None,
            group_id: Some(gid),
        }),
        label: format!("{group_name} — Exports ({year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn overtime_products_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let (year, start_year, end_year) = year_range(params);
    vec![
        AtlasLink {
            url: explore_overtime_url(year, start_year, end_year, cid, None),
            label: format!("{name} — Trade Over Time ({start_year}–{end_year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
        AtlasLink {
            url: explore_treemap_url(&TreemapParams {
                year,
                country_id: Some(cid),
                partner_id: None,
                product_classification: None,
                product_id: None,
                view: None,
                group_id: None,
            }),
            label: format!("{name} — Export Basket ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
    ]
}

fn overtime_partners_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let (year, start_year, end_year) = year_range(params);
    vec![AtlasLink {
        url: explore_overtime_url(year, start_year, end_year, cid, Some("markets")),
        label: format!("{name} — Partners Over Time ({start_year}–{end_year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn marketshare_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let (year, start_year, end_year) = year_range(params);
    vec![AtlasLink {
        url: explore_marketshare_url(year, start_year, end_year, cid),
        label: format!("{name} — Global Market Share ({start_year}–{end_year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn product_space_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    vec![
        AtlasLink {
            url: explore_productspace_url(year, cid),
            label: format!("{name} — Product Space ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
        AtlasLink {
            url: country_page_url(cid, Some("export-complexity")),
            label: format!("{name} — Export Complexity"),
            link_type: LinkType::CountryPage,
            resolution_notes: notes(params),
        },
    ]
}

fn feasibility_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    vec![
        AtlasLink {
            url: explore_feasibility_url(year, cid),
            label: format!("{name} — Growth Opportunities ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
        AtlasLink {
            url: explore_feasibility_table_url(year, cid, DEFAULT_PRODUCT_LEVEL),
            label: format!("{name} — Growth Opportunities Table ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        },
    ]
}

fn feasibility_table_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    let level = get_i64(params, "product_level").unwrap_or(DEFAULT_PRODUCT_LEVEL);
    vec![AtlasLink {
        url: explore_feasibility_table_url(year, cid, level),
        label: format!("{name} — Growth Opportunities Table ({year})"),
        link_type: LinkType::ExplorePage,
        resolution_notes: notes(params),
    }]
}

fn growth_opportunities_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    if is_frontier_country(cid) {
        return vec![AtlasLink {
            url: explore_feasibility_url(year, cid),
            label: format!("{name} — Growth Opportunities ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        }];
    }
    vec![AtlasLink {
        url: country_page_url(cid, Some("growth-opportunities")),
        label: format!("{name} — Growth Opportunities"),
        link_type: LinkType::CountryPage,
        resolution_notes: notes(params),
    }]
}

fn product_table_links(params: &Value) -> Vec<AtlasLink> {
    let Some(cid) = get_i64(params, "country_id") else {
        return vec![];
    };
    let name = country_name(params, cid);
    let year = year(params);
    let level = get_i64(params, "product_level").unwrap_or(DEFAULT_PRODUCT_LEVEL);
    if is_frontier_country(cid) {
        return vec![AtlasLink {
            url: explore_feasibility_table_url(year, cid, level),
            label: format!("{name} — Growth Opportunities Table ({year})"),
            link_type: LinkType::ExplorePage,
            resolution_notes: notes(params),
        }];
    }
    vec![AtlasLink {
        url: country_page_url(cid, Some("product-table")),
        label: format!("{name} — Product Table"),
        link_type: LinkType::CountryPage,
        resolution_notes: notes(params),
    }]
}

/// Generates links for a classified query. Depends only on its arguments and
/// module-level constants. Query types with no page mapping return an empty
/// list.
pub fn generate_atlas_links(query_type: QueryType, params: &Value) -> Vec<AtlasLink> {
    match query_type {
        QueryType::CountryProfile
        | QueryType::CountryProfileExports
        | QueryType::CountryProfileComplexity
        | QueryType::CountryYear => country_profile_links(params),
        QueryType::CountryLookback => country_lookback_links(params),
        QueryType::NewProducts => new_products_links(params),
        QueryType::GrowthOpportunities => growth_opportunities_links(params),
        QueryType::ProductTable => product_table_links(params),
        QueryType::TreemapProducts => treemap_products_links(params),
        QueryType::TreemapPartners => treemap_partners_links(params),
        QueryType::TreemapBilateral
        | QueryType::ExploreBilateral
        | QueryType::BilateralAggregate => bilateral_links(params),
        QueryType::ProductInfo => product_info_links(params),
        QueryType::ExploreGroup => explore_group_links(params),
        QueryType::OvertimeProducts => overtime_products_links(params),
        QueryType::OvertimePartners => overtime_partners_links(params),
        QueryType::Marketshare => marketshare_links(params),
        QueryType::ProductSpace => product_space_links(params),
        QueryType::Feasibility => feasibility_links(params),
        QueryType::FeasibilityTable => feasibility_table_links(params),
        QueryType::GlobalDatum | QueryType::ExploreDataAvailability | QueryType::Reject => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: link generation is pure: same inputs, same output.
    #[test]
    fn generation_is_deterministic() {
        let params = json!({"country_id": 404, "country_name": "Kenya", "year": 2024});
        let a = generate_atlas_links(QueryType::TreemapProducts, &params);
        let b = generate_atlas_links(QueryType::TreemapProducts, &params);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a[0].url.contains("exporter=country-404"));
        assert!(a[0].label.contains("Kenya"));
    }

    /// **Scenario**: frontier countries get explore fallbacks for the
    /// growth-opportunities and product-table subpages.
    #[test]
    fn frontier_fallback() {
        let frontier = json!({"country_id": 840, "country_name": "United States", "year": 2024});
        let links = generate_atlas_links(QueryType::GrowthOpportunities, &frontier);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].link_type, LinkType::ExplorePage);
        assert!(links[0].url.contains("/explore/feasibility?"));

        let non_frontier = json!({"country_id": 404, "country_name": "Kenya", "year": 2024});
        let links = generate_atlas_links(QueryType::GrowthOpportunities, &non_frontier);
        assert_eq!(links[0].link_type, LinkType::CountryPage);
        assert!(links[0].url.ends_with("/countries/404/growth-opportunities"));

        let links = generate_atlas_links(QueryType::ProductTable, &frontier);
        assert!(links[0].url.contains("/explore/feasibility/table?"));
    }

    /// **Scenario**: bilateral links name both countries and set importer.
    #[test]
    fn bilateral_link_shape() {
        let params = json!({
            "country_id": 76, "country_name": "Brazil",
            "partner_id": 32, "partner_name": "Argentina",
            "year": 2020
        });
        let links = generate_atlas_links(QueryType::TreemapBilateral, &params);
        assert_eq!(links.len(), 1);
        assert!(links[0].url.contains("importer=country-32"));
        assert_eq!(links[0].label, "Brazil → Argentina (2020)");
    }

    /// **Scenario**: unmapped query types produce no links.
    #[test]
    fn unmapped_types_produce_nothing() {
        assert!(generate_atlas_links(QueryType::GlobalDatum, &json!({})).is_empty());
        assert!(generate_atlas_links(QueryType::ExploreDataAvailability, &json!({})).is_empty());
        assert!(generate_atlas_links(QueryType::Reject, &json!({})).is_empty());
    }

    /// **Scenario**: missing required params degrade to no links, not panics.
    #[test]
    fn missing_params_yield_empty() {
        assert!(generate_atlas_links(QueryType::TreemapProducts, &json!({})).is_empty());
        assert!(generate_atlas_links(QueryType::TreemapBilateral, &json!({"country_id": 76})).is_empty());
    }

    /// **Scenario**: time-series links honor year ranges.
    #[test]
    fn overtime_uses_year_range() {
        let params = json!({"country_id": 156, "country_name": "China", "year_min": 2010, "year_max": 2020});
        let links = generate_atlas_links(QueryType::OvertimePartners, &params);
        assert!(links[0].url.contains("startYear=2010"));
        assert!(links[0].url.contains("endYear=2020"));
        assert!(links[0].url.contains("view=markets"));
    }
}
