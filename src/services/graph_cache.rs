//! Process-local cache for materialized dashboard series (§4.6). Keyed by
//! `(subject_id, kind, filter, unit)`; re-validated against the current
//! row-count of the underlying table rather than a TTL.

use std::sync::Mutex;

use lru::LruCache;
use serde_json::Value;
use uuid::Uuid;

const DEFAULT_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    User,
    ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesUnit {
    Tokens,
    Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: Uuid,
    pub kind: SubjectKind,
    pub filter: String,
    pub unit: SeriesUnit,
}

#[derive(Debug, Clone)]
pub struct CachedSeries {
    pub base_count: i64,
    pub series: Value,
}

/// An at-most-one-entry-per-key LRU. Spec terms call for unbounded size;
/// we cap and evict LRU as the spec explicitly permits.
pub struct GraphCache {
    inner: Mutex<LruCache<CacheKey, CachedSeries>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(DEFAULT_CAPACITY).unwrap(),
            )),
        }
    }

    /// Returns the cached series only if `current_count` matches the
    /// count recorded at materialization time.
    pub fn get_if_fresh(&self, key: &CacheKey, current_count: i64) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        let cached = inner.get(key)?;
        if cached.base_count == current_count {
            Some(cached.series.clone())
        } else {
            None
        }
    }

    pub fn put(&self, key: CacheKey, base_count: i64, series: Value) {
        let mut inner = self.inner.lock().unwrap();
        inner.put(key, CachedSeries { base_count, series });
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> CacheKey {
        CacheKey {
            subject_id: Uuid::nil(),
            kind: SubjectKind::User,
            filter: "7 days".to_string(),
            unit: SeriesUnit::Tokens,
        }
    }

    #[test]
    fn stale_entry_is_not_served() {
        let cache = GraphCache::new();
        cache.put(key(), 10, json!([1, 2, 3]));
        assert!(cache.get_if_fresh(&key(), 10).is_some());
        assert!(cache.get_if_fresh(&key(), 11).is_none());
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = GraphCache::new();
        assert!(cache.get_if_fresh(&key(), 0).is_none());
    }
}
