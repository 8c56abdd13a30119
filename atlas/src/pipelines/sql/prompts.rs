//! Few-shot prompt assembly for SQL generation.

use serde::{Deserialize, Serialize};

use crate::config::{TradeDirection, TradeMode};

/// One example question/SQL pair for the few-shot prompt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExampleQuery {
    pub question: String,
    pub query: String,
}

/// Built-in example library; replaceable via config with a JSON file of the
/// same shape.
pub fn default_example_queries() -> Vec<ExampleQuery> {
    vec![
        ExampleQuery {
            question: "What were Brazil's top 5 exports in 2020?".into(),
            query: "SELECT p.name_short_en AS product, SUM(cpy.export_value) AS export_value\n\
                    FROM hs92.country_product_year_4 cpy\n\
                    JOIN classification.location_country lc ON cpy.country_id = lc.country_id\n\
                    JOIN classification.product_hs92 p ON cpy.product_id = p.product_id\n\
                    WHERE lc.iso3_code = 'BRA' AND cpy.year = 2020\n\
                    GROUP BY p.name_short_en\n\
                    ORDER BY export_value DESC\n\
                    LIMIT 5"
                .into(),
        },
        ExampleQuery {
            question: "How much cotton did the US import from India in 2021?".into(),
            query: "SELECT SUM(ccpy.import_value) AS import_value\n\
                    FROM hs92.country_country_product_year_4 ccpy\n\
                    JOIN classification.location_country imp ON ccpy.country_id = imp.country_id\n\
                    JOIN classification.location_country exp ON ccpy.partner_country_id = exp.country_id\n\
                    JOIN classification.product_hs92 p ON ccpy.product_id = p.product_id\n\
                    WHERE imp.iso3_code = 'USA' AND exp.iso3_code = 'IND'\n\
                      AND p.code IN ('5201', '5202') AND ccpy.year = 2021"
                .into(),
        },
        ExampleQuery {
            question: "Which countries exported the most services in 2019?".into(),
            query: "SELECT lc.name_short_en AS country, SUM(cpy.export_value) AS export_value\n\
                    FROM services_unilateral.country_product_year_4 cpy\n\
                    JOIN classification.location_country lc ON cpy.country_id = lc.country_id\n\
                    WHERE cpy.year = 2019\n\
                    GROUP BY lc.name_short_en\n\
                    ORDER BY export_value DESC\n\
                    LIMIT 15"
                .into(),
        },
    ]
}

pub struct SqlPromptInputs<'a> {
    pub codes: Option<&'a str>,
    pub top_k: usize,
    pub table_info: &'a str,
    pub direction_constraint: Option<TradeDirection>,
    pub mode_constraint: Option<TradeMode>,
    pub context: &'a str,
}

/// The instruction prefix ahead of the few-shot examples.
pub fn build_sql_generation_prefix(inputs: &SqlPromptInputs<'_>) -> String {
    let mut prefix = format!(
        "You are a PostgreSQL expert for an international trade database. Given a question, \
         write a syntactically correct PostgreSQL query that answers it.\n\n\
         Rules:\n\
         - Return at most {top_k} rows unless the question asks otherwise (use LIMIT {top_k}).\n\
         - Only use tables and columns shown below; qualify every table with its schema.\n\
         - Join classification.location_country for country names/ISO codes and the matching \
           classification product table for product names.\n\
         - Trade values are in current US dollars.\n\
         - Return only the SQL query, no explanation and no code fences.\n\n\
         Available tables:\n{table_info}\n",
        top_k = inputs.top_k,
        table_info = inputs.table_info,
    );

    if let Some(codes) = inputs.codes {
        prefix.push_str(&format!(
            "\nResolved product codes for this question:{codes}\n\
             Use these codes when filtering products.\n"
        ));
    }
    if let Some(direction) = inputs.direction_constraint {
        prefix.push_str(&format!(
            "\nConstraint: the user fixed the trade direction to **{}** — use the matching value columns even if the question implies otherwise.\n",
            direction.as_str()
        ));
    }
    if let Some(mode) = inputs.mode_constraint {
        prefix.push_str(&format!(
            "\nConstraint: the user fixed the trade mode to **{}** — stay within the matching schemas.\n",
            mode.as_str()
        ));
    }
    if !inputs.context.is_empty() {
        prefix.push_str(&format!(
            "\nAdditional context from the caller:\n{}\n",
            inputs.context
        ));
    }
    prefix
}

/// Full few-shot prompt: prefix, examples, then the question.
pub fn build_sql_generation_prompt(
    inputs: &SqlPromptInputs<'_>,
    examples: &[ExampleQuery],
    question: &str,
) -> String {
    let mut prompt = build_sql_generation_prefix(inputs);
    prompt.push('\n');
    for example in examples {
        prompt.push_str(&format!(
            "User question: {}\nSQL query: {}\n\n",
            example.question, example.query
        ));
    }
    prompt.push_str(&format!("User question: {question}\nSQL query: "));
    prompt
}

/// Strips code fences the model sometimes wraps around SQL.
pub fn strip_sql_fences(raw: &str) -> String {
    raw.trim()
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}
