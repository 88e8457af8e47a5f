// ABOUTME: Generic per-class LRU+TTL cache used for each of the four entity classes
// ABOUTME: Manual capacity enforcement (rather than LruCache's own cap) so warmup can bypass eviction
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Snapshot of a class's observable metrics (§6: per-class `{entries, hits, misses, evictions}`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassStats {
    /// Current entry count.
    pub entries: usize,
    /// Cumulative cache hits.
    pub hits: u64,
    /// Cumulative cache misses.
    pub misses: u64,
    /// Cumulative evictions.
    pub evictions: u64,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    payload: T,
    expires_at: DateTime<Utc>,
}

impl<T> Entry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A bounded, TTL-aware LRU cache for one entity class.
///
/// Capacity is enforced manually rather than via `LruCache`'s own bound: [`insert_bypass`]
/// (used by warmup's `LoadFromStore`) must be able to insert more entries than `max_size`
/// without evicting, and only have normal [`set`] calls gradually evict back down to
/// `max_size` as new distinct keys arrive (§4.B).
pub struct ClassCache<T> {
    inner: Arc<RwLock<LruCache<String, Entry<T>>>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> ClassCache<T> {
    /// Create a new, empty class cache bounded at `max_size` entries under normal operation.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LruCache::unbounded())),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up `key`. Expired entries are treated as a miss and removed. A hit moves the
    /// entry to the most-recently-used end.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = Utc::now();
        let mut guard = self.inner.write().await;

        match guard.get(key) {
            Some(entry) if entry.is_expired(now) => {
                guard.pop(key);
                drop(guard);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                let payload = entry.payload.clone();
                drop(guard);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(payload)
            }
            None => {
                drop(guard);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace `key`. A `ttl` of zero or negative duration means "do not cache" and
    /// is a no-op. Evicts the LRU entry first if inserting a new key at capacity.
    pub async fn set(&self, key: String, payload: T, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let mut guard = self.inner.write().await;

        let mut evicted_key = None;
        if !guard.contains(&key) && guard.len() >= self.max_size {
            evicted_key = guard.pop_lru().map(|(k, _)| k);
        }

        guard.put(key, Entry { payload, expires_at });
        drop(guard);

        if let Some(evicted_key) = evicted_key {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            crate::logging::GuildLogger::log_cache_eviction("class", &evicted_key);
        }
    }

    /// Insert `key` with an absolute expiry, bypassing capacity enforcement entirely. Used
    /// only by `LoadFromStore` during warmup so the persisted working set survives intact.
    pub async fn insert_bypass(&self, key: String, payload: T, expires_at: DateTime<Utc>) {
        let mut guard = self.inner.write().await;
        guard.put(key, Entry { payload, expires_at });
    }

    /// Remove a single entry.
    pub async fn invalidate(&self, key: &str) {
        self.inner.write().await.pop(key);
    }

    /// Remove every entry whose key starts with `prefix`. Returns the number removed.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut guard = self.inner.write().await;
        let matching: Vec<String> = guard
            .iter()
            .filter_map(|(k, _)| k.starts_with(prefix).then(|| k.clone()))
            .collect();
        for key in &matching {
            guard.pop(key);
        }
        matching.len()
    }

    /// Drop every entry expired as of `now`. Used by the background cleaner.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write().await;
        let expired: Vec<String> = guard
            .iter()
            .filter_map(|(k, v)| v.is_expired(now).then(|| k.clone()))
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        expired.len()
    }

    /// Snapshot every non-expired entry as `(key, payload, expires_at)`, for persistence.
    pub async fn snapshot_non_expired(&self) -> Vec<(String, T, DateTime<Utc>)> {
        let now = Utc::now();
        let guard = self.inner.read().await;
        guard
            .iter()
            .filter(|(_, v)| !v.is_expired(now))
            .map(|(k, v)| (k.clone(), v.payload.clone(), v.expires_at))
            .collect()
    }

    /// Current observable metrics.
    pub async fn stats(&self) -> ClassStats {
        ClassStats {
            entries: self.inner.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lru_eviction_boundary_scenario() {
        // §8 Boundary scenario 1: maxMembers=3, Set(a,b,c), Get(a), Set(d) -> {a,c,d}, evictions=1
        let cache: ClassCache<&'static str> = ClassCache::new(3);
        let ttl = Duration::from_secs(60);

        cache.set("a".into(), "A", ttl).await;
        cache.set("b".into(), "B", ttl).await;
        cache.set("c".into(), "C", ttl).await;
        assert_eq!(cache.get("a").await, Some("A"));
        cache.set("d".into(), "D", ttl).await;

        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.get("c").await, Some("C"));
        assert_eq!(cache.get("d").await, Some("D"));
        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 3);
    }

    #[tokio::test]
    async fn expiry_boundary_scenario() {
        let cache: ClassCache<&'static str> = ClassCache::new(10);
        cache.set("k".into(), "v", Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn zero_ttl_is_a_no_op() {
        let cache: ClassCache<&'static str> = ClassCache::new(10);
        cache.set("k".into(), "v", Duration::ZERO).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn set_on_existing_key_refreshes_without_evicting() {
        let cache: ClassCache<&'static str> = ClassCache::new(2);
        let ttl = Duration::from_secs(60);
        cache.set("a".into(), "A", ttl).await;
        cache.set("b".into(), "B", ttl).await;
        cache.set("a".into(), "A2", ttl).await;

        assert_eq!(cache.get("a").await, Some("A2"));
        assert_eq!(cache.get("b").await, Some("B"));
        assert_eq!(cache.stats().await.evictions, 0);
    }

    #[tokio::test]
    async fn insert_bypass_exceeds_max_size() {
        let cache: ClassCache<&'static str> = ClassCache::new(1);
        let future = Utc::now() + chrono::Duration::seconds(60);
        cache.insert_bypass("a".into(), "A", future).await;
        cache.insert_bypass("b".into(), "B", future).await;

        assert_eq!(cache.stats().await.entries, 2);

        // A subsequent normal Set re-evicts back toward max_size.
        cache.set("c".into(), "C", Duration::from_secs(60)).await;
        assert_eq!(cache.stats().await.entries, 2);
        assert!(cache.stats().await.evictions >= 1);
    }

    #[tokio::test]
    async fn invalidate_prefix_removes_matching_keys_only() {
        let cache: ClassCache<&'static str> = ClassCache::new(10);
        let ttl = Duration::from_secs(60);
        cache.set("1:100".into(), "a", ttl).await;
        cache.set("1:200".into(), "b", ttl).await;
        cache.set("2:300".into(), "c", ttl).await;

        let removed = cache.invalidate_prefix("1:").await;
        assert_eq!(removed, 2);
        assert!(cache.get("2:300").await.is_some());
    }
}
