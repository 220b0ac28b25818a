//! Shared keyed cache of query results.
//!
//! Any component may read. Mutations write through [`QueryCache::update`] and
//! mark entries stale with [`QueryCache::invalidate`] once the backend has
//! confirmed a change, so the next read re-fetches. Optimistic writers take a
//! [`CacheSnapshot`] first and hand it back to [`QueryCache::restore`] when the
//! remote call fails.

mod keys;

pub use keys::{CachedValue, QueryKey, QueryScope};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: CachedValue,
    pub stale: bool,
    pub updated_at: DateTime<Utc>,
}

/// Entries exactly as they were when captured; `None` means the key was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Option<CacheEntry>)>,
}

impl CacheSnapshot {
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<CachedValue> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// The cached value, unless it has been invalidated.
    pub fn get_fresh(&self, key: &QueryKey) -> Option<CachedValue> {
        self.entries
            .get(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: QueryKey, value: CachedValue) {
        tracing::trace!(target: "freepal::query_cache::set", "Caching {}", key);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                updated_at: Utc::now(),
            },
        );
    }

    /// Rewrites a present entry in place. Returns false when the key is absent.
    pub fn update<F>(&self, key: &QueryKey, f: F) -> bool
    where
        F: FnOnce(&mut CachedValue),
    {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                f(&mut entry.value);
                entry.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Marks the entry stale but keeps serving its value until it is refetched.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            tracing::debug!(target: "freepal::query_cache::invalidate", "Invalidating {}", key);
            entry.stale = true;
        }
    }

    pub fn invalidate_scope(&self, scope: QueryScope) {
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().scope() == scope {
                entry.stale = true;
                count += 1;
            }
        }
        tracing::debug!(
            target: "freepal::query_cache::invalidate_scope",
            "Invalidated {} entries under {:?}",
            count,
            scope
        );
    }

    pub fn invalidate_all(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.stale = true;
        }
    }

    pub fn remove(&self, key: &QueryKey) -> Option<CachedValue> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// `None` when the key is not cached at all.
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.entries.get(key).map(|entry| entry.stale)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys whose cached value satisfies `predicate`.
    pub fn keys_matching<P>(&self, predicate: P) -> Vec<QueryKey>
    where
        P: Fn(&QueryKey, &CachedValue) -> bool,
    {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.key(), &entry.value))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self, keys: &[QueryKey]) -> CacheSnapshot {
        let entries = keys
            .iter()
            .map(|key| (key.clone(), self.entries.get(key).map(|entry| entry.clone())))
            .collect();
        tracing::debug!(
            target: "freepal::query_cache::snapshot",
            "Captured {} entries",
            keys.len()
        );
        CacheSnapshot { entries }
    }

    /// Puts every captured key back exactly as it was, removing keys that
    /// did not exist when the snapshot was taken.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        tracing::debug!(
            target: "freepal::query_cache::restore",
            "Restoring {} entries",
            snapshot.len()
        );
        for (key, entry) in snapshot.entries {
            match entry {
                Some(entry) => {
                    self.entries.insert(key, entry);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freepal::posts::PostFeed;
    use crate::freepal::test_utils::{sample_post, sample_reaction};

    #[test]
    fn test_set_get_and_invalidate() {
        let cache = QueryCache::new();
        let key = QueryKey::Post("p1".to_string());
        cache.set(key.clone(), CachedValue::Post(sample_post("p1", 2, None)));

        assert_eq!(cache.is_stale(&key), Some(false));
        assert!(cache.get_fresh(&key).is_some());

        cache.invalidate(&key);
        assert_eq!(cache.is_stale(&key), Some(true));
        assert!(cache.get_fresh(&key).is_none());
        // Stale values are still served to plain reads
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.is_stale(&QueryKey::Users), None);
    }

    #[test]
    fn test_invalidate_scope_only_touches_that_root() {
        let cache = QueryCache::new();
        let my = QueryKey::Posts(PostFeed::My);
        let public = QueryKey::Posts(PostFeed::Public);
        let single = QueryKey::Post("p1".to_string());
        cache.set(my.clone(), CachedValue::Posts(vec![sample_post("p1", 0, None)]));
        cache.set(public.clone(), CachedValue::Posts(vec![]));
        cache.set(single.clone(), CachedValue::Post(sample_post("p1", 0, None)));

        cache.invalidate_scope(QueryScope::Posts);

        assert_eq!(cache.is_stale(&my), Some(true));
        assert_eq!(cache.is_stale(&public), Some(true));
        assert_eq!(cache.is_stale(&single), Some(false));
    }

    #[test]
    fn test_update_absent_key_is_noop() {
        let cache = QueryCache::new();
        let touched = cache.update(&QueryKey::Post("p1".to_string()), |_| {
            panic!("closure must not run for an absent key")
        });
        assert!(!touched);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_restore_returns_keys_to_captured_state() {
        let cache = QueryCache::new();
        let post_key = QueryKey::Post("p1".to_string());
        let reactions_key = QueryKey::Reactions("p1".to_string());
        cache.set(post_key.clone(), CachedValue::Post(sample_post("p1", 5, None)));
        cache.invalidate(&post_key);

        let snapshot = cache.snapshot(&[post_key.clone(), reactions_key.clone()]);

        cache.set(post_key.clone(), CachedValue::Post(sample_post("p1", 6, None)));
        cache.set(
            reactions_key.clone(),
            CachedValue::Reactions(vec![sample_reaction("r1", "p1", "u1")]),
        );

        cache.restore(snapshot);

        let restored = cache.get(&post_key).unwrap();
        assert_eq!(restored.as_post().unwrap().reactions.count, 5);
        // Staleness is part of the captured state
        assert_eq!(cache.is_stale(&post_key), Some(true));
        assert!(!cache.contains(&reactions_key));
    }

    #[test]
    fn test_keys_matching_finds_feeds_holding_post() {
        let cache = QueryCache::new();
        cache.set(
            QueryKey::Posts(PostFeed::My),
            CachedValue::Posts(vec![sample_post("p1", 0, None), sample_post("p2", 0, None)]),
        );
        cache.set(
            QueryKey::Posts(PostFeed::Public),
            CachedValue::Posts(vec![sample_post("p3", 0, None)]),
        );

        let keys = cache.keys_matching(|key, value| {
            key.scope() == QueryScope::Posts && value.contains_post("p2")
        });

        assert_eq!(keys, vec![QueryKey::Posts(PostFeed::My)]);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            QueryKey::Posts(PostFeed::Community("c1".to_string())).to_string(),
            "[posts, community:c1]"
        );
        assert_eq!(QueryKey::Post("p1".to_string()).to_string(), "[post, p1]");
    }
}
