//! In-memory cache for query results
//!
//! Entries are keyed by the statement text plus its bindings, expire after a
//! fixed TTL, and can be dropped explicitly for a manual refresh.

use crate::platform::QueryRequest;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for the query cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached results
    pub capacity: usize,
    /// How long an entry stays fresh
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry past its TTL
    pub expirations: u64,
    /// Hits as a percentage of lookups
    pub hit_rate: f64,
}

struct CacheEntry<V> {
    value: Arc<V>,
    loaded_at: Instant,
}

/// LRU cache of query results with a freshness window
pub struct QueryCache<V> {
    memory: LruCache<String, CacheEntry<V>>,
    ttl: Duration,
    hits: u64,
    misses: u64,
    expirations: u64,
}

impl<V> QueryCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: LruCache::new(capacity),
            ttl: config.ttl,
            hits: 0,
            misses: 0,
            expirations: 0,
        }
    }

    /// Look up a fresh result for this request
    pub fn get(&mut self, request: &QueryRequest) -> Option<Arc<V>> {
        self.get_at(request, Instant::now())
    }

    pub fn get_at(&mut self, request: &QueryRequest, now: Instant) -> Option<Arc<V>> {
        let key = Self::cache_key(request);

        let fresh = match self.memory.get(&key) {
            Some(entry) if now.duration_since(entry.loaded_at) < self.ttl => {
                Some(Arc::clone(&entry.value))
            }
            Some(_) => None,
            None => {
                debug!("Cache miss: {}", &key[..8]);
                self.misses += 1;
                return None;
            }
        };

        match fresh {
            Some(value) => {
                debug!("Cache hit: {}", &key[..8]);
                self.hits += 1;
                Some(value)
            }
            None => {
                debug!("Cache entry expired: {}", &key[..8]);
                self.memory.pop(&key);
                self.expirations += 1;
                self.misses += 1;
                None
            }
        }
    }

    /// Store a result for this request
    pub fn put(&mut self, request: &QueryRequest, value: Arc<V>) {
        self.put_at(request, value, Instant::now());
    }

    pub fn put_at(&mut self, request: &QueryRequest, value: Arc<V>, loaded_at: Instant) {
        let key = Self::cache_key(request);
        debug!("Cached result: {}", &key[..8]);
        self.memory.put(key, CacheEntry { value, loaded_at });
    }

    /// Drop the entry for this request; true if one was present
    pub fn invalidate(&mut self, request: &QueryRequest) -> bool {
        self.memory.pop(&Self::cache_key(request)).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.memory.len(),
            capacity: self.memory.cap().get(),
            hits: self.hits,
            misses: self.misses,
            expirations: self.expirations,
            hit_rate: self.hit_rate(),
        }
    }

    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Key from statement text and bindings
    fn cache_key(request: &QueryRequest) -> String {
        let mut material = request.statement.clone();
        for binding in &request.bindings {
            material.push('\u{1f}');
            material.push_str(binding);
        }
        format!("{:x}", md5::compute(material.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_secs: u64) -> QueryCache<String> {
        QueryCache::new(CacheConfig {
            capacity,
            ttl: Duration::from_secs(ttl_secs),
        })
    }

    fn select(table: &str) -> QueryRequest {
        QueryRequest::new(format!("SELECT * FROM {}", table))
    }

    #[test]
    fn test_cache_key_includes_bindings() {
        let plain = QueryCache::<String>::cache_key(&QueryRequest::new("SELECT ?"));
        let bound_a = QueryCache::<String>::cache_key(&QueryRequest::new("SELECT ?").bind("a"));
        let bound_b = QueryCache::<String>::cache_key(&QueryRequest::new("SELECT ?").bind("b"));
        let again = QueryCache::<String>::cache_key(&QueryRequest::new("SELECT ?").bind("a"));

        assert_ne!(plain, bound_a);
        assert_ne!(bound_a, bound_b);
        assert_eq!(bound_a, again);
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = cache(10, 60);
        assert!(cache.get(&select("T")).is_none());

        cache.put(&select("T"), Arc::new("rows".to_string()));
        assert_eq!(cache.get(&select("T")).as_deref(), Some(&"rows".to_string()));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let mut cache = cache(10, 60);
        let loaded = Instant::now();
        cache.put_at(&select("T"), Arc::new("rows".to_string()), loaded);

        assert!(cache.get_at(&select("T"), loaded + Duration::from_secs(59)).is_some());
        assert!(cache.get_at(&select("T"), loaded + Duration::from_secs(60)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = cache(2, 60);
        cache.put(&select("A"), Arc::new("a".to_string()));
        cache.put(&select("B"), Arc::new("b".to_string()));
        cache.put(&select("C"), Arc::new("c".to_string())); // evicts A

        assert!(cache.get(&select("A")).is_none());
        assert!(cache.get(&select("B")).is_some());
        assert!(cache.get(&select("C")).is_some());
    }

    #[test]
    fn test_invalidate() {
        let mut cache = cache(10, 60);
        cache.put(&select("T"), Arc::new("rows".to_string()));

        assert!(cache.invalidate(&select("T")));
        assert!(!cache.invalidate(&select("T")));
        assert!(cache.get(&select("T")).is_none());
    }

    #[test]
    fn test_hit_rate() {
        let mut cache = cache(10, 60);
        cache.put(&select("T"), Arc::new("rows".to_string()));
        cache.get(&select("T")); // Hit
        cache.get(&select("T")); // Hit
        cache.get(&select("U")); // Miss

        assert!((cache.hit_rate() - 66.666).abs() < 1.0);
        assert_eq!(cache.stats().hit_rate, cache.hit_rate());
    }
}
