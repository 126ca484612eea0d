//! Cache Store
//!
//! Process-local, thread-safe key/value cache shared by every service. Values
//! are type-erased behind `Arc<dyn Any>` so one store can hold permission
//! matrices, entity lists and blacklist markers side by side.
//!
//! Concurrent `get_or_create` calls for the same missing key may both run
//! the factory; the later write wins. Invalidation is by key prefix, and
//! every invalidated prefix keeps a generation counter: a fill whose factory
//! overlapped an invalidation of its key is discarded instead of cached.

use dashmap::DashMap;
use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Eviction priority when the store is over capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    /// Only removed by explicit removal, invalidation or its own expiry
    NeverRemove,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheEntryOptions {
    pub ttl: Option<Duration>,
    pub priority: CachePriority,
}

impl CacheEntryOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn never_remove() -> Self {
        Self {
            ttl: None,
            priority: CachePriority::NeverRemove,
        }
    }

    pub fn priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Option<Instant>,
    priority: CachePriority,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
    /// Invalidation count per prefix
    generations: DashMap<String, u64>,
    /// 0 means unbounded
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_capacity_limit(0)
    }

    pub fn with_capacity_limit(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached value for `key`, if present, unexpired and of type `T`
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                if let Some(value) = entry.value.downcast_ref::<T>() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value.clone());
                }
                false
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries.get(key).is_some_and(|entry| !entry.is_expired(now))
    }

    pub fn set<T>(&self, key: impl Into<String>, value: T, options: CacheEntryOptions)
    where
        T: Send + Sync + 'static,
    {
        let now = Instant::now();
        let entry = CacheEntry {
            value: Arc::new(value),
            expires_at: options.ttl.map(|ttl| now + ttl),
            priority: options.priority,
            inserted_at: now,
        };
        self.entries.insert(key.into(), entry);

        if self.max_entries > 0 && self.entries.len() > self.max_entries {
            self.evict();
        }
    }

    /// Return the cached value or build, store and return it.
    ///
    /// Factory errors are returned as-is and nothing is cached.
    pub async fn get_or_create<T, E, F, Fut>(&self, key: &str, options: CacheEntryOptions, factory: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let generation = self.generation(key);
        let value = factory().await?;
        self.set(key, value.clone(), options);
        // checked after the insert: an invalidation that bumps later also
        // removes the entry, one that bumped earlier is seen here
        if self.generation(key) != generation {
            self.entries.remove(key);
            debug!(key, "Discarded cache fill that overlapped an invalidation");
        }
        Ok(value)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`; returns how many
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.bump_generation(prefix);
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if key.starts_with(prefix) {
                removed += 1;
                false
            } else {
                true
            }
        });
        debug!(prefix, removed, "Cache prefix invalidated");
        removed
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.bump_generation("");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn bump_generation(&self, prefix: &str) {
        *self.generations.entry(prefix.to_string()).or_insert(0) += 1;
    }

    /// Sum of the counters of every invalidated prefix `key` falls under
    fn generation(&self, key: &str) -> u64 {
        self.generations
            .iter()
            .filter(|generation| key.starts_with(generation.key().as_str()))
            .map(|generation| *generation.value())
            .sum()
    }

    /// Expired entries go first, then the lowest priority and oldest.
    /// `NeverRemove` entries are skipped, so the store may stay over its limit.
    fn evict(&self) {
        self.purge_expired();
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return;
        }

        let mut candidates: Vec<(CachePriority, Instant, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.priority != CachePriority::NeverRemove)
            .map(|entry| (entry.priority, entry.inserted_at, entry.key().clone()))
            .collect();
        candidates.sort();

        let mut evicted = 0;
        for (_, _, key) in candidates.into_iter().take(excess) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        debug!(evicted, limit = self.max_entries, "Cache entries evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_typed_value() {
        let cache = CacheStore::new();
        cache.set("Department_GetAll", vec![1, 2, 3], CacheEntryOptions::default());

        assert_eq!(cache.get::<Vec<i32>>("Department_GetAll"), Some(vec![1, 2, 3]));
        // wrong type is a miss, not a panic
        assert_eq!(cache.get::<String>("Department_GetAll"), None);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = CacheStore::new();
        cache.set("k", 1u8, CacheEntryOptions::with_ttl(Duration::ZERO));

        assert_eq!(cache.get::<u8>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_prefix_only_touches_matching_keys() {
        let cache = CacheStore::new();
        cache.set("Department_GetAll", 1, CacheEntryOptions::default());
        cache.set("Department_Find_ab12", 2, CacheEntryOptions::default());
        cache.set("RolePermission_Id_1", 3, CacheEntryOptions::never_remove());

        assert_eq!(cache.invalidate_prefix("Department_"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("RolePermission_Id_1"));
    }

    #[test]
    fn test_eviction_respects_priority() {
        let cache = CacheStore::with_capacity_limit(2);
        cache.set("pinned", 0, CacheEntryOptions::never_remove());
        cache.set("low", 1, CacheEntryOptions::default().priority(CachePriority::Low));
        cache.set("high", 2, CacheEntryOptions::default().priority(CachePriority::High));

        assert!(cache.contains("pinned"));
        assert!(cache.contains("high"));
        assert!(!cache.contains("low"));
    }

    #[test]
    fn test_never_remove_entries_survive_pressure() {
        let cache = CacheStore::with_capacity_limit(1);
        cache.set("a", 1, CacheEntryOptions::never_remove());
        cache.set("b", 2, CacheEntryOptions::never_remove());

        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_get_or_create_runs_factory_once() {
        let cache = CacheStore::new();
        let calls = AtomicU64::new(0);

        for _ in 0..3 {
            let value: Result<String, ()> = cache
                .get_or_create("Greeting", CacheEntryOptions::default(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("hello".to_string())
                })
                .await;
            assert_eq!(value.unwrap(), "hello");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fill_overlapping_an_invalidation_is_discarded() {
        let cache = CacheStore::new();

        let value: Result<u32, ()> = cache
            .get_or_create("Department_GetAll", CacheEntryOptions::default(), || async {
                cache.invalidate_prefix("Department_");
                Ok(1)
            })
            .await;
        assert_eq!(value, Ok(1));
        assert!(!cache.contains("Department_GetAll"));

        // other prefixes don't disturb the fill
        let value: Result<u32, ()> = cache
            .get_or_create("Department_GetAll", CacheEntryOptions::default(), || async {
                cache.invalidate_prefix("RolePermission_");
                Ok(2)
            })
            .await;
        assert_eq!(value, Ok(2));
        assert_eq!(cache.get::<u32>("Department_GetAll"), Some(2));
    }

    #[tokio::test]
    async fn test_factory_errors_are_not_cached() {
        let cache = CacheStore::new();

        let failed: Result<u32, &str> = cache
            .get_or_create("Flaky", CacheEntryOptions::default(), || async { Err("boom") })
            .await;
        assert!(failed.is_err());
        assert!(!cache.contains("Flaky"));

        let recovered: Result<u32, &str> = cache
            .get_or_create("Flaky", CacheEntryOptions::default(), || async { Ok(7) })
            .await;
        assert_eq!(recovered, Ok(7));
    }
}
