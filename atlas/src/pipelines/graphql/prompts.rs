//! Prompt builders for the GraphQL pipeline's model calls.

/// Classification prompt: question → query type + endpoint.
pub fn build_classification_prompt(question: &str, context: &str) -> String {
    let mut prompt = format!(
        "Classify this question about trade data or economic complexity into the query type \
         that best answers it.\n\n\
         Routing guidance:\n\
         - Time-series questions ('how has X changed since Y') → overtime_* or marketshare.\n\
         - Growth opportunity / diversification questions → feasibility, feasibility_table, or growth_opportunities.\n\
         - 'What does country X export' snapshot questions → treemap_products or product_table.\n\
         - Country overview / profile questions → country_profile; export-basket questions → \
           country_profile_exports; ECI/COI/complexity-ranking questions → country_profile_complexity.\n\
         - Total bilateral value between two countries → bilateral_aggregate; product-level bilateral \
           breakdowns → treemap_bilateral or explore_bilateral.\n\
         - Choose 'reject' when the question needs custom SQL aggregation (GROUP BY, SUM, AVG), \
           multi-table joins, or data the APIs do not carry — and say why in rejection_reason.\n\
         - Explore endpoint: raw trade data, bilateral flows, time series, feasibility.\n\
         - Country-pages endpoint: country_profile*, country_lookback, new_products, growth_opportunities.\n\n\
         Question: {question}\n"
    );
    if !context.is_empty() {
        prompt.push_str(&format!("Context from prior turns: {context}\n"));
    }
    prompt
}

/// Entity-extraction prompt: question (+ chosen query type) → entities.
pub fn build_extraction_prompt(question: &str, query_type: &str, context: &str) -> String {
    let mut prompt = format!(
        "Extract the entities needed to build a '{query_type}' query from this question about \
         trade data.\n\n\
         Guidelines:\n\
         - Give ISO alpha-3 guesses for countries and HS code guesses for products when you can.\n\
         - Set year for a single year, year_min/year_max for a range.\n\
         - Default product_level to fourDigit unless the question implies otherwise.\n\
         - Only set fields the question actually mentions.\n\n\
         Question: {question}\n"
    );
    if !context.is_empty() {
        prompt.push_str(&format!("Context from prior turns: {context}\n"));
    }
    prompt
}
