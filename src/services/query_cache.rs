// Tool Response Cache
//
// In-process TTL cache shared by every tool call. Keys are derived from the
// operation name and the call payload with secrets removed.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::middleware::AppError;
use crate::models::SECRET_FIELDS;

/// Cached value with its absolute expiry. `None` means the TTL lies beyond
/// what the clock can represent, so the entry never expires.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    expires_at: Option<Instant>,
    value: V,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Store<V> {
    entries: HashMap<String, CacheEntry<V>>,
    stats: CacheStats,
}

/// Bounded TTL cache.
///
/// Every read and write goes through one lock over the whole store. When full,
/// the entry closest to expiry is evicted (not the least recently used one).
pub struct TtlCache<V> {
    store: Mutex<Store<V>>,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
            max_entries: max_entries.max(1),
        }
    }

    /// Return the live value for `key`; expired entries are dropped on sight.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.store.lock().await;
        let store = &mut *guard;
        let now = Instant::now();

        match store.entries.get(key) {
            None => {
                store.stats.misses += 1;
                tracing::debug!("Cache miss for key: {}", key);
                None
            }
            Some(entry) if entry.is_expired(now) => {
                store.entries.remove(key);
                store.stats.misses += 1;
                store.stats.expirations += 1;
                tracing::debug!("Cache expired for key: {}", key);
                None
            }
            Some(entry) => {
                store.stats.hits += 1;
                tracing::debug!("Cache hit for key: {}", key);
                Some(entry.value.clone())
            }
        }
    }

    /// Store `value` for `ttl_secs` seconds, evicting one entry if full.
    pub async fn set(&self, key: String, value: V, ttl_secs: u64) {
        let mut store = self.store.lock().await;

        if store.entries.len() >= self.max_entries && !store.entries.contains_key(&key) {
            let soonest = store
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.expires_at.is_none(), entry.expires_at))
                .map(|(key, _)| key.clone());

            if let Some(evicted) = soonest {
                store.entries.remove(&evicted);
                store.stats.evictions += 1;
                tracing::debug!("Evicted cache entry: {}", evicted);
            }
        }

        let expires_at = Instant::now().checked_add(Duration::from_secs(ttl_secs));
        store.entries.insert(key.clone(), CacheEntry { expires_at, value });

        tracing::debug!("Cached result for key: {} (cache size: {})", key, store.entries.len());
    }

    /// Clear all cache entries
    pub async fn clear(&self) {
        let mut store = self.store.lock().await;
        let count = store.entries.len();
        store.entries.clear();
        tracing::info!("Cleared {} cache entries", count);
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats.clone()
    }

    pub async fn size(&self) -> usize {
        self.store.lock().await.entries.len()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

/// Derive the cache key for `operation` called with `payload`.
///
/// Object keys are emitted in sorted order at every depth and any field named
/// in [`SECRET_FIELDS`] is dropped, so field order and passwords never change
/// the key.
pub fn cache_key<T: Serialize>(operation: &str, payload: &T) -> Result<String, AppError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::Internal(format!("Failed to serialize cache key payload: {}", e)))?;
    Ok(format!("{}:{}", operation, canonicalize(value)))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(field, _)| !SECRET_FIELDS.contains(&field.as_str()))
                .map(|(field, value)| (field, canonicalize(value)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
