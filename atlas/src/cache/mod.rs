//! In-process caching for expensive deterministic operations.
//!
//! Two cache styles:
//!
//! 1. [`TtlCache`]: per-query TTL caches for product-details lookups, text
//!    search, and table DDL reflection, with canonical keys from [`keys`].
//! 2. [`CatalogCache`]: lazy-loaded, TTL-bounded caches for entire catalog
//!    datasets (countries, products, services), indexed for O(1) lookups by
//!    multiple keys, with stampede prevention.
//!
//! The [`CacheRegistry`] tracks all caches for observability.

mod catalog;
pub mod keys;
mod registry;
mod ttl;

pub use catalog::{CatalogCache, CatalogStats, Fetcher, KeyFn, NormalizeFn, Timer};
pub use registry::CacheRegistry;
pub use ttl::TtlCache;

use thiserror::Error;

/// Errors from cache operations.
///
/// `UnknownIndex` and `NotPopulated` indicate programming errors (a lookup
/// against an index that was never registered, or a sync lookup before any
/// async step populated the cache); they surface as 500-class failures, not
/// user errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("catalog '{cache}' has no index named '{index}'")]
    UnknownIndex { cache: String, index: String },

    #[error("catalog '{0}' is not populated — call populate() or await lookup() first")]
    NotPopulated(String),

    #[error("catalog '{cache}' has no fetcher and is not populated")]
    NoFetcher { cache: String },

    #[error("catalog fetch failed: {0}")]
    Fetch(String),
}
