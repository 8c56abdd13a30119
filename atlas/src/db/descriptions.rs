//! Per-schema table descriptions used for DDL assembly and validation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One table within a schema.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    pub context_str: String,
}

/// Table descriptions keyed by schema name. The `classification` key holds
/// the lookup tables shared across data schemas.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableDescriptions(pub HashMap<String, Vec<TableDescription>>);

/// Marker for group-level aggregate tables excluded from DDL assembly.
pub(crate) const GROUP_AGGREGATE_MARKER: &str = "group_group_";

impl TableDescriptions {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw).map(Self)
    }

    /// Built-in descriptions covering the five data schemas plus the
    /// classification lookup tables.
    pub fn builtin() -> Self {
        Self::from_json_str(include_str!("table_descriptions.json"))
            .expect("embedded table descriptions are valid JSON")
    }

    /// All tables in the selected schemas, schema-qualified.
    pub fn tables_in_schemas(&self, schemas: &[String]) -> Vec<(String, String)> {
        let mut tables = Vec::new();
        for schema in schemas {
            if let Some(entries) = self.0.get(schema) {
                for table in entries {
                    tables.push((
                        format!("{schema}.{}", table.table_name),
                        table.context_str.clone(),
                    ));
                }
            }
        }
        tables
    }

    /// The classification lookup tables needed for joins: always the country
    /// table, plus the matching product table per selected schema.
    pub fn classification_tables_for(&self, schemas: &[String]) -> Vec<(String, String)> {
        let mut tables = vec![(
            "classification.location_country".to_string(),
            "Country-level data with names, ISO codes, and hierarchical information.".to_string(),
        )];
        let mut seen: Vec<&str> = vec!["classification.location_country"];

        let by_name: HashMap<&str, &TableDescription> = self
            .0
            .get("classification")
            .map(|entries| {
                entries
                    .iter()
                    .map(|t| (t.table_name.as_str(), t))
                    .collect()
            })
            .unwrap_or_default();

        for schema in schemas {
            let Some(qualified) = super::schema_products_table(schema) else {
                continue;
            };
            if seen.contains(&qualified) {
                continue;
            }
            let bare = qualified.split_once('.').map(|(_, t)| t).unwrap_or(qualified);
            if let Some(entry) = by_name.get(bare) {
                tables.push((qualified.to_string(), entry.context_str.clone()));
                seen.push(qualified);
            }
        }
        tables
    }
}
