//! Realtime invalidation.
//!
//! The backend publishes a [`ChangeEvent`] for every row written. The client
//! never patches the cache from these events; it only marks the affected
//! queries stale so the next read goes back to the store.

mod feed;
mod types;

pub use feed::ChangeFeed;
pub use types::{ChangeEvent, ChangeKind, Invalidation, invalidations_for};

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::freepal::FreePal;
use crate::freepal::query_cache::QueryCache;
use crate::freepal::remote::Collection;

/// Collections whose changes affect cached queries.
const WATCHED_COLLECTIONS: [Collection; 6] = [
    Collection::Posts,
    Collection::Reactions,
    Collection::Comments,
    Collection::Users,
    Collection::Communities,
    Collection::CommunityMembers,
];

pub(crate) fn apply_invalidations(cache: &QueryCache, invalidations: &[Invalidation]) {
    for invalidation in invalidations {
        match invalidation {
            Invalidation::Key(key) => cache.invalidate(key),
            Invalidation::Scope(scope) => cache.invalidate_scope(*scope),
        }
    }
}

impl FreePal {
    /// Runs a task that invalidates cached queries for every event on `receiver`
    /// until the channel closes.
    ///
    /// A lagging receiver has lost events, so everything cached is marked stale.
    pub fn spawn_realtime_invalidation(
        &self,
        mut receiver: broadcast::Receiver<ChangeEvent>,
    ) -> JoinHandle<()> {
        let cache: Arc<QueryCache> = self.cache.clone();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        tracing::debug!(
                            target: "freepal::realtime::invalidation",
                            "{:?} on {}",
                            event.kind,
                            event.collection
                        );
                        apply_invalidations(&cache, &invalidations_for(&event));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: "freepal::realtime::invalidation",
                            "Missed {} change events, invalidating all queries",
                            skipped
                        );
                        cache.invalidate_all();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Subscribes to every collection that backs a cached query.
    pub fn watch_changes(&self, feed: &ChangeFeed) -> Vec<JoinHandle<()>> {
        WATCHED_COLLECTIONS
            .iter()
            .map(|collection| self.spawn_realtime_invalidation(feed.subscribe(*collection)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freepal::posts::PostFeed;
    use crate::freepal::query_cache::{CachedValue, QueryKey};
    use crate::freepal::remote::{RemoteStore, row};
    use crate::freepal::test_utils::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_comment_event_marks_thread_stale() {
        let (freepal, _store, _identity, _logs) = create_mock_freepal().await;
        let feed = ChangeFeed::new();
        let comments_key = QueryKey::Comments("p1".to_string());
        let feed_key = QueryKey::Posts(PostFeed::Public);
        freepal.cache.set(comments_key.clone(), CachedValue::Comments(vec![]));
        freepal.cache.set(feed_key.clone(), CachedValue::Posts(vec![]));

        let handle = freepal.spawn_realtime_invalidation(feed.subscribe(Collection::Comments));
        feed.emit(ChangeEvent {
            collection: Collection::Comments,
            kind: ChangeKind::Insert,
            new: Some(row(json!({"id": "c9", "post_id": "p1"}))),
            old: None,
        });
        drop(feed);
        handle.await.unwrap();

        assert_eq!(freepal.cache.is_stale(&comments_key), Some(true));
        assert_eq!(freepal.cache.is_stale(&feed_key), Some(true));
    }

    #[tokio::test]
    async fn test_store_writes_flow_through_change_feed() {
        let feed = Arc::new(ChangeFeed::new());
        let (freepal, store, _identity, _logs) = create_mock_freepal_with_feed(feed.clone()).await;
        let handles = freepal.watch_changes(&feed);

        let reactions_key = QueryKey::Reactions(POST_PUBLIC.to_string());
        freepal
            .cache
            .set(reactions_key.clone(), CachedValue::Reactions(vec![]));

        store
            .insert(
                Collection::Reactions,
                row(json!({"post_id": POST_PUBLIC, "user_id": BOB, "type": "wow"})),
            )
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while freepal.cache.is_stale(&reactions_key) != Some(true) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("reaction insert should invalidate the reaction list");

        for handle in handles {
            handle.abort();
        }
    }
}
