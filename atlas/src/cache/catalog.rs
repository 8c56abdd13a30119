//! CatalogCache: lazy-loaded, TTL-bounded cache for a whole catalog dataset.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use super::CacheError;

/// Extracts the index key from a catalog entry; `None` excludes the entry.
pub type KeyFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// Normalizes a lookup query so lookups are case/whitespace-insensitive.
pub type NormalizeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Async loader producing the full dataset.
pub type Fetcher = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<Value>, CacheError>> + Send>> + Send + Sync,
>;

/// Monotonic clock, injectable for TTL tests. Returns elapsed time since an
/// arbitrary fixed origin.
pub type Timer = Arc<dyn Fn() -> Duration + Send + Sync>;

struct Index {
    key_fn: KeyFn,
    normalize: NormalizeFn,
    data: HashMap<String, Value>,
}

impl Index {
    fn build(&mut self, entries: &[Value]) {
        let mut data = HashMap::new();
        for entry in entries {
            if let Some(key) = (self.key_fn)(entry) {
                data.insert(key, entry.clone());
            }
        }
        self.data = data;
    }

    fn get(&self, query: &str) -> Option<Value> {
        self.data.get(&(self.normalize)(query)).cloned()
    }
}

struct Storage {
    entries: Vec<Value>,
    indexes: HashMap<String, Index>,
    populated_at: Option<Duration>,
}

/// Catalog stats for the registry.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CatalogStats {
    pub populated: bool,
    pub size: usize,
    pub ttl_seconds: u64,
    pub age_seconds: Option<f64>,
    pub indexes: Vec<String>,
}

/// Lazy-loaded, TTL-bounded, multi-index catalog cache.
///
/// All indexes are rebuilt under one write lock from the same entry list, so
/// there is never a window where indexes disagree. A cold-cache fetch runs
/// under an async mutex with a double check, so concurrent first accesses
/// trigger exactly one fetch; fetch failures propagate and leave the cache
/// empty. The lock is never held across the fetch's suspension point by
/// readers: only the single fetching task awaits inside it.
pub struct CatalogCache {
    name: String,
    ttl: Duration,
    timer: Timer,
    storage: RwLock<Storage>,
    fetcher: RwLock<Option<Fetcher>>,
    fetch_lock: Mutex<()>,
}

impl CatalogCache {
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        let origin = Instant::now();
        Self::with_timer(name, ttl, Arc::new(move || origin.elapsed()))
    }

    /// Injects a monotonic clock (tests).
    pub fn with_timer(name: impl Into<String>, ttl: Duration, timer: Timer) -> Self {
        Self {
            name: name.into(),
            ttl,
            timer,
            storage: RwLock::new(Storage {
                entries: Vec::new(),
                indexes: HashMap::new(),
                populated_at: None,
            }),
            fetcher: RwLock::new(None),
            fetch_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an exact-match index. Call before first population; entries
    /// already cached are re-indexed immediately.
    pub fn add_index(&self, name: impl Into<String>, key_fn: KeyFn, normalize: NormalizeFn) {
        let mut storage = self.storage.write().unwrap();
        let mut index = Index {
            key_fn,
            normalize,
            data: HashMap::new(),
        };
        index.build(&storage.entries);
        storage.indexes.insert(name.into(), index);
    }

    /// Registers the async loader used on cold or expired access.
    pub fn set_fetcher(&self, fetcher: Fetcher) {
        *self.fetcher.write().unwrap() = Some(fetcher);
    }

    /// Directly loads entries, bypassing the fetcher. Rebuilds every index
    /// and resets the TTL timer.
    pub fn populate(&self, entries: Vec<Value>) {
        let now = (self.timer)();
        let mut storage = self.storage.write().unwrap();
        storage.entries = entries;
        let entries = storage.entries.clone();
        for index in storage.indexes.values_mut() {
            index.build(&entries);
        }
        storage.populated_at = Some(now);
    }

    /// Exact lookup by a named index, fetching if cold or expired.
    pub async fn lookup(&self, index_name: &str, key: &str) -> Result<Option<Value>, CacheError> {
        self.ensure_populated().await?;
        self.lookup_in_storage(index_name, key)
    }

    /// Exact lookup requiring the cache to be already populated. Used in
    /// post-processing where an earlier async step guarantees population.
    pub fn lookup_sync(&self, index_name: &str, key: &str) -> Result<Option<Value>, CacheError> {
        if !self.is_populated() {
            return Err(CacheError::NotPopulated(self.name.clone()));
        }
        self.lookup_in_storage(index_name, key)
    }

    fn lookup_in_storage(&self, index_name: &str, key: &str) -> Result<Option<Value>, CacheError> {
        let storage = self.storage.read().unwrap();
        let index = storage
            .indexes
            .get(index_name)
            .ok_or_else(|| CacheError::UnknownIndex {
                cache: self.name.clone(),
                index: index_name.to_string(),
            })?;
        Ok(index.get(key))
    }

    /// Case-insensitive substring search over `field`, at most `limit`
    /// results in encounter order.
    pub async fn search(
        &self,
        field: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, CacheError> {
        self.ensure_populated().await?;
        let needle = query.trim().to_lowercase();
        let storage = self.storage.read().unwrap();
        let mut results = Vec::new();
        for entry in &storage.entries {
            if let Some(value) = entry.get(field).and_then(Value::as_str) {
                if value.to_lowercase().contains(&needle) {
                    results.push(entry.clone());
                    if results.len() >= limit {
                        break;
                    }
                }
            }
        }
        Ok(results)
    }

    /// Full snapshot, fetching if needed.
    pub async fn get_all(&self) -> Result<Vec<Value>, CacheError> {
        self.ensure_populated().await?;
        Ok(self.storage.read().unwrap().entries.clone())
    }

    /// Empties storage and resets the TTL timer.
    pub fn clear(&self) {
        let mut storage = self.storage.write().unwrap();
        storage.entries.clear();
        storage.populated_at = None;
        for index in storage.indexes.values_mut() {
            index.data.clear();
        }
    }

    /// Whether the cache currently holds data (ignores TTL).
    pub fn is_populated(&self) -> bool {
        self.storage.read().unwrap().populated_at.is_some()
    }

    pub fn stats(&self) -> CatalogStats {
        let storage = self.storage.read().unwrap();
        let age = storage
            .populated_at
            .map(|at| ((self.timer)() - at).as_secs_f64());
        CatalogStats {
            populated: storage.populated_at.is_some(),
            size: storage.entries.len(),
            ttl_seconds: self.ttl.as_secs(),
            age_seconds: age,
            indexes: storage.indexes.keys().cloned().collect(),
        }
    }

    fn is_valid(&self) -> bool {
        let storage = self.storage.read().unwrap();
        match storage.populated_at {
            Some(at) => (self.timer)() - at < self.ttl,
            None => false,
        }
    }

    async fn ensure_populated(&self) -> Result<(), CacheError> {
        if self.is_valid() {
            return Ok(());
        }
        let _guard = self.fetch_lock.lock().await;
        // Another task may have fetched while we waited.
        if self.is_valid() {
            return Ok(());
        }
        let fetcher = self
            .fetcher
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| CacheError::NoFetcher {
                cache: self.name.clone(),
            })?;
        info!(catalog = %self.name, "fetching catalog data");
        let entries = fetcher().await?;
        let count = entries.len();
        self.populate(entries);
        info!(catalog = %self.name, entries = count, "populated catalog");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    fn iso3_index(cache: &CatalogCache) {
        cache.add_index(
            "iso3",
            Arc::new(|e: &Value| {
                e.get("iso3Code")
                    .and_then(Value::as_str)
                    .map(|s| s.to_uppercase())
                    .filter(|s| !s.is_empty())
            }),
            Arc::new(|q: &str| q.trim().to_uppercase()),
        );
    }

    fn countries() -> Vec<Value> {
        vec![
            json!({"countryId": 76, "iso3Code": "BRA", "nameShortEn": "Brazil"}),
            json!({"countryId": 404, "iso3Code": "KEN", "nameShortEn": "Kenya"}),
            json!({"countryId": 840, "iso3Code": "USA", "nameShortEn": "United States"}),
        ]
    }

    /// **Scenario**: lookups normalize keys: `lookup(i, k1) == lookup(i, k2)`
    /// whenever `normalize(k1) == normalize(k2)`.
    #[tokio::test]
    async fn lookup_normalizes_keys() {
        let cache = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&cache);
        cache.populate(countries());

        let a = cache.lookup("iso3", "bra").await.unwrap();
        let b = cache.lookup("iso3", "  BRA ").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.unwrap()["countryId"], 76);
    }

    /// **Scenario**: populate then lookup returns the same entry regardless
    /// of insertion order.
    #[tokio::test]
    async fn populate_order_does_not_matter() {
        let forward = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&forward);
        forward.populate(countries());

        let reversed = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&reversed);
        let mut entries = countries();
        entries.reverse();
        reversed.populate(entries);

        assert_eq!(
            forward.lookup("iso3", "KEN").await.unwrap(),
            reversed.lookup("iso3", "KEN").await.unwrap()
        );
    }

    /// **Scenario**: an unknown index name is a programming error.
    #[tokio::test]
    async fn unknown_index_is_error() {
        let cache = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&cache);
        cache.populate(countries());
        let err = cache.lookup("hs_code", "BRA").await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownIndex { .. }));
    }

    /// **Scenario**: lookup_sync before population fails with NotPopulated.
    #[test]
    fn lookup_sync_requires_population() {
        let cache = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&cache);
        let err = cache.lookup_sync("iso3", "BRA").unwrap_err();
        assert!(matches!(err, CacheError::NotPopulated(_)));
    }

    /// **Scenario**: search is a case-insensitive substring match capped at
    /// limit, in encounter order.
    #[tokio::test]
    async fn search_substring_with_limit() {
        let cache = CatalogCache::new("countries", Duration::from_secs(60));
        cache.populate(countries());
        let hits = cache.search("nameShortEn", "united", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["iso3Code"], "USA");

        let all = cache.search("nameShortEn", "a", 2).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    /// **Scenario**: concurrent cold-cache lookups trigger exactly one fetch.
    #[tokio::test]
    async fn stampede_prevention_single_fetch() {
        let fetches = Arc::new(AtomicU32::new(0));
        let cache = Arc::new(CatalogCache::new("countries", Duration::from_secs(60)));
        iso3_index(&cache);
        let counter = Arc::clone(&fetches);
        cache.set_fetcher(Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(countries())
            })
        }));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.lookup("iso3", "BRA").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_some());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: a fetch failure propagates and the cache stays empty.
    #[tokio::test]
    async fn fetch_failure_leaves_cache_empty() {
        let cache = CatalogCache::new("countries", Duration::from_secs(60));
        iso3_index(&cache);
        cache.set_fetcher(Arc::new(|| {
            Box::pin(async { Err(CacheError::Fetch("upstream down".into())) })
        }));
        assert!(cache.lookup("iso3", "BRA").await.is_err());
        assert!(!cache.is_populated());
    }

    /// **Scenario**: an expired TTL triggers a refetch (injected clock).
    #[tokio::test]
    async fn ttl_expiry_refetches() {
        let clock = Arc::new(AtomicU64::new(0));
        let clock_ref = Arc::clone(&clock);
        let timer: Timer = Arc::new(move || Duration::from_secs(clock_ref.load(Ordering::SeqCst)));
        let cache = CatalogCache::with_timer("countries", Duration::from_secs(10), timer);
        iso3_index(&cache);
        let fetches = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fetches);
        cache.set_fetcher(Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(countries())
            })
        }));

        cache.lookup("iso3", "BRA").await.unwrap();
        cache.lookup("iso3", "KEN").await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        clock.store(11, Ordering::SeqCst);
        cache.lookup("iso3", "KEN").await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
