//! Tool schemas bound to the agent model.
//!
//! Schema-only: execution routes through the graph pipelines, never through
//! a tool callback.

use serde_json::json;

use crate::llm::ToolSpec;

pub const QUERY_TOOL: &str = "query_tool";
pub const ATLAS_GRAPHQL_TOOL: &str = "atlas_graphql";
pub const DOCS_TOOL: &str = "docs_tool";

pub fn query_tool_spec() -> ToolSpec {
    ToolSpec {
        name: QUERY_TOOL.to_string(),
        description: "Generates and executes SQL queries on the trade database. \
                      Input should be a natural language question about trade data."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "A question about international trade data"
                },
                "context": {
                    "type": "string",
                    "description": "Additional technical context (e.g. metric definitions, data caveats) that may help answer the query accurately. Optional."
                }
            },
            "required": ["question"]
        }),
    }
}

pub fn atlas_graphql_tool_spec() -> ToolSpec {
    ToolSpec {
        name: ATLAS_GRAPHQL_TOOL.to_string(),
        description: "Queries the Atlas platform's GraphQL API for pre-calculated economic \
                      complexity metrics, country profiles, and trade visualizations.\n\
                      Use for: country profiles (GDP, population, ECI rank, diversification grade), \
                      complexity trends over time, products a country recently started exporting, \
                      bilateral trade breakdowns, product market share, growth opportunities and \
                      feasibility metrics, and pre-calculated visualizations (treemaps, over-time charts).\n\
                      Do NOT use for custom aggregations (GROUP BY, SUM, AVG — use query_tool), \
                      multi-table SQL joins, or any question this tool REJECTS — on rejection, \
                      fall back to query_tool.\n\
                      Returns JSON data plus Atlas visualization links when available."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "A question about trade data or economic complexity"
                },
                "context": {
                    "type": "string",
                    "description": "Additional context from prior turns that may help answer the question. Optional."
                }
            },
            "required": ["question"]
        }),
    }
}

pub fn docs_tool_spec() -> ToolSpec {
    ToolSpec {
        name: DOCS_TOOL.to_string(),
        description: "Looks up the system's documentation: product classification systems, \
                      complexity metric definitions, and data coverage/caveats. Free — does not \
                      count against the query budget."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "A question about the data model, metrics, or coverage"
                }
            },
            "required": ["question"]
        }),
    }
}
