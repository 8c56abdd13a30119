//! Pre-execution SQL validation.
//!
//! Pure functions: no LLM calls, no DB access. Parsing uses `sqlparser`
//! with the Postgres dialect; only schema-qualified table references are
//! checked against the valid set, so CTE names never false-positive.

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::OnceLock;

use regex::Regex;
use sqlparser::ast::visit_relations;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::warn;

/// Result of SQL validation.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    /// Whether the SQL passed all critical checks.
    pub is_valid: bool,
    /// Critical issues that prevent execution.
    pub errors: Vec<String>,
    /// Informational issues, logged but not blocking.
    pub warnings: Vec<String>,
    pub sql: String,
}

fn ddl_table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(\w+\.\w+)").unwrap()
    })
}

/// Extracts schema-qualified table names from a DDL string.
pub fn extract_table_names_from_ddl(table_info: &str) -> BTreeSet<String> {
    ddl_table_regex()
        .captures_iter(table_info)
        .map(|c| c[1].to_string())
        .collect()
}

/// Schema-qualified tables referenced by a parsed statement list.
pub fn extract_query_tables(sql: &str) -> BTreeSet<String> {
    let Ok(statements) = Parser::parse_sql(&PostgreSqlDialect {}, sql) else {
        return BTreeSet::new();
    };
    let mut tables = BTreeSet::new();
    let _ = visit_relations(&statements, |relation| {
        let name = relation.to_string();
        if name.contains('.') {
            tables.insert(name);
        }
        ControlFlow::<()>::Continue(())
    });
    tables
}

/// Validates a SQL string before execution.
///
/// Checks: empty SQL, syntax parse, referenced tables against `valid_tables`.
/// `SELECT *` and leading-wildcard `LIKE '%...'` produce warnings but are
/// allowed.
pub fn validate_sql(sql: &str, valid_tables: &BTreeSet<String>) -> ValidationResult {
    if sql.trim().is_empty() {
        return ValidationResult {
            is_valid: false,
            errors: vec!["SQL is empty or whitespace-only.".to_string()],
            warnings: vec![],
            sql: sql.to_string(),
        };
    }

    let statements = match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            return ValidationResult {
                is_valid: false,
                errors: vec![format!("SQL syntax error: {e}")],
                warnings: vec![],
                sql: sql.to_string(),
            }
        }
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut query_tables = BTreeSet::new();
    let _ = visit_relations(&statements, |relation| {
        let name = relation.to_string();
        if name.contains('.') {
            query_tables.insert(name);
        }
        ControlFlow::<()>::Continue(())
    });
    let unknown: Vec<&String> = query_tables.difference(valid_tables).collect();
    if !unknown.is_empty() {
        errors.push(format!(
            "Unknown table(s): {}. Valid tables: {}",
            unknown
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            valid_tables
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }

    static SELECT_STAR: OnceLock<Regex> = OnceLock::new();
    if SELECT_STAR
        .get_or_init(|| Regex::new(r"(?i)SELECT\s+\*").unwrap())
        .is_match(sql)
    {
        warnings.push("Query uses SELECT * — consider selecting specific columns.".to_string());
    }

    static LEADING_WILDCARD: OnceLock<Regex> = OnceLock::new();
    if let Some(m) = LEADING_WILDCARD
        .get_or_init(|| Regex::new(r"(?i)LIKE\s+'(%[^']*)'").unwrap())
        .captures(sql)
    {
        warnings.push(format!(
            "LIKE pattern '{}' has a leading wildcard — this prevents index usage and may be slow.",
            &m[1]
        ));
    }

    for w in &warnings {
        warn!(warning = %w, "SQL validation warning");
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        sql: sql.to_string(),
    }
}
