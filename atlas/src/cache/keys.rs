//! Canonical cache keys.
//!
//! Order-insensitive keys sort before joining; case/whitespace-insensitive
//! keys normalize before joining. Doing the normalization in one place keeps
//! `key(a, b) == key(b, a)` a property instead of a convention.

use std::collections::BTreeSet;

/// Key for product-details lookups: order-independent over codes.
pub fn product_details_key(codes: &[String], schema: &str) -> String {
    let sorted: BTreeSet<&str> = codes.iter().map(String::as_str).collect();
    format!(
        "{}|{}",
        sorted.into_iter().collect::<Vec<_>>().join(","),
        schema
    )
}

/// Key for product text search: case- and whitespace-insensitive.
pub fn text_search_key(term: &str, schema: &str) -> String {
    format!("{}|{}", term.trim().to_lowercase(), schema)
}

/// Key for table-DDL assembly: order-independent over schemas.
pub fn table_info_key(schemas: &[String]) -> String {
    let sorted: BTreeSet<&str> = schemas.iter().map(String::as_str).collect();
    sorted.into_iter().collect::<Vec<_>>().join(",")
}
