//! Registry of named caches with hit/miss counters, for observability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use super::{CatalogCache, TtlCache};

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Tracks TTL caches and catalog caches by name; serves `/debug/caches`.
#[derive(Default)]
pub struct CacheRegistry {
    ttl_caches: Mutex<HashMap<String, Arc<TtlCache<String, Value>>>>,
    counters: Mutex<HashMap<String, Arc<Counters>>>,
    catalogs: Mutex<HashMap<String, Arc<CatalogCache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a TTL cache.
    pub fn create(&self, name: &str, maxsize: usize, ttl: Duration) -> Arc<TtlCache<String, Value>> {
        let cache = Arc::new(TtlCache::new(maxsize, ttl));
        self.ttl_caches
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&cache));
        self.counters
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(Counters::default()));
        cache
    }

    /// Registers a catalog cache for stats and clear_all.
    pub fn register_catalog(&self, catalog: Arc<CatalogCache>) {
        self.catalogs
            .lock()
            .unwrap()
            .insert(catalog.name().to_string(), catalog);
    }

    pub fn record_hit(&self, name: &str) {
        if let Some(c) = self.counters.lock().unwrap().get(name) {
            c.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_miss(&self, name: &str) {
        if let Some(c) = self.counters.lock().unwrap().get(name) {
            c.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Per-cache stats for both cache styles.
    pub fn stats(&self) -> Value {
        let mut out = serde_json::Map::new();
        {
            let caches = self.ttl_caches.lock().unwrap();
            let counters = self.counters.lock().unwrap();
            for (name, cache) in caches.iter() {
                let (hits, misses) = counters
                    .get(name)
                    .map(|c| (c.hits.load(Ordering::Relaxed), c.misses.load(Ordering::Relaxed)))
                    .unwrap_or((0, 0));
                let total = hits + misses;
                out.insert(
                    name.clone(),
                    json!({
                        "hits": hits,
                        "misses": misses,
                        "hit_rate": if total > 0 { hits as f64 / total as f64 } else { 0.0 },
                        "size": cache.len(),
                        "maxsize": cache.maxsize(),
                        "ttl": cache.ttl().as_secs(),
                    }),
                );
            }
        }
        for (name, catalog) in self.catalogs.lock().unwrap().iter() {
            out.insert(name.clone(), serde_json::to_value(catalog.stats()).unwrap_or(Value::Null));
        }
        Value::Object(out)
    }

    /// Clears every registered cache.
    pub fn clear_all(&self) {
        for cache in self.ttl_caches.lock().unwrap().values() {
            cache.clear();
        }
        for catalog in self.catalogs.lock().unwrap().values() {
            catalog.clear();
        }
    }
}
