//! Bounded TTL cache for per-query results.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Size- and TTL-bounded map. Eviction drops the oldest entry when full;
/// expired entries are dropped on access. The lock is never held across an
/// await: callers compute misses outside and insert after.
pub struct TtlCache<K, V> {
    maxsize: usize,
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            maxsize,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((at, value)) if at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.maxsize && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (at, _))| *at)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                entries.remove(&k);
            }
        }
        entries.insert(key, (Instant::now(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: basic get/insert plus size-bound eviction.
    #[test]
    fn ttl_cache_bounds_size() {
        let cache: TtlCache<String, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"c".to_string()), Some(3));
    }

    /// **Scenario**: expired entries are not returned.
    #[test]
    fn ttl_cache_expires() {
        let cache: TtlCache<String, u32> = TtlCache::new(8, Duration::from_millis(0));
        cache.insert("a".into(), 1);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get(&"a".to_string()), None);
    }
}
