//! Optimistic reaction toggling.
//!
//! A toggle runs in four steps: snapshot every cached view that shows the
//! post's reaction state, apply the computed change to all of them at once,
//! commit to the backend, then either mark the views stale (success) or put
//! the snapshot back (failure). The remote commit is the only await between
//! apply and reconcile.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::transition::{ReactionTransition, apply_to_reaction_list};
use super::types::{Reaction, ReactionCommit, ReactionType};
use crate::freepal::FreePal;
use crate::freepal::error::{FreePalError, Result};
use crate::freepal::query_cache::{CachedValue, QueryKey, QueryScope};
use crate::freepal::remote::{Collection, Filter, Query, from_row, row};

impl FreePal {
    /// Toggles `reaction_type` on a post for the acting user.
    ///
    /// Same type as the user's current reaction removes it, a different type
    /// replaces it, no reaction adds one. Every cached view of the post shows
    /// the result before the backend is called; a failed commit restores them
    /// exactly and publishes a notice.
    ///
    /// # Arguments
    ///
    /// * `post_id` - The post being reacted to
    /// * `reaction_type` - The reaction the user picked
    /// * `acting_user_id` - The user the UI is acting as; the commit itself
    ///   re-resolves the identity before writing
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` before anything is touched when nobody is signed in.
    /// `NotFound` when the post disappeared before the commit. Any remote
    /// failure after the optimistic apply is returned once the views are rolled back.
    pub async fn toggle_reaction(
        &self,
        post_id: &str,
        reaction_type: ReactionType,
        acting_user_id: &str,
    ) -> Result<ReactionCommit> {
        if let Err(err) = self.require_user_id().await {
            self.notices.publish(err.notice());
            return Err(err);
        }

        let permit = if self.config.serialize_reaction_toggles {
            let semaphore = self
                .reaction_guards
                .entry(post_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone();

            Some(semaphore.acquire_owned().await.map_err(|_| {
                FreePalError::Other(anyhow::anyhow!(
                    "Failed to acquire reaction guard for post {}",
                    post_id
                ))
            })?)
        } else {
            None
        };

        let result = self
            .toggle_reaction_exclusive(post_id, reaction_type, acting_user_id)
            .await;

        if let Some(permit) = permit {
            drop(permit);
            // Only the map's own handle left means no toggle is running or waiting
            self.reaction_guards
                .remove_if(post_id, |_, semaphore| Arc::strong_count(semaphore) == 1);
        }

        result
    }

    /// Snapshot, apply, commit and reconcile. Runs while holding the post's guard
    /// when toggles are serialized.
    async fn toggle_reaction_exclusive(
        &self,
        post_id: &str,
        reaction_type: ReactionType,
        acting_user_id: &str,
    ) -> Result<ReactionCommit> {
        let keys = self.reaction_view_keys(post_id);
        let snapshot = self.cache.snapshot(&keys);

        let existing = self.cached_user_reaction(post_id, acting_user_id);
        let transition = ReactionTransition::resolve(existing, reaction_type);
        self.apply_reaction_transition(&keys, post_id, acting_user_id, &transition);

        tracing::debug!(
            target: "freepal::reactions::toggle_reaction",
            "Applied {:?} to {} cached views of post {}",
            transition,
            keys.len(),
            post_id
        );

        match self.commit_reaction(post_id, reaction_type).await {
            Ok(commit) => {
                for key in &keys {
                    self.cache.invalidate(key);
                }
                self.cache.invalidate(&QueryKey::Post(post_id.to_string()));
                self.cache
                    .invalidate(&QueryKey::Reactions(post_id.to_string()));
                self.cache.invalidate_scope(QueryScope::Posts);

                tracing::info!(
                    target: "freepal::reactions::toggle_reaction",
                    "Committed {:?} on post {}",
                    commit,
                    post_id
                );
                Ok(commit)
            }
            Err(err) => {
                self.cache.restore(snapshot);

                tracing::warn!(
                    target: "freepal::reactions::toggle_reaction",
                    "Rolled back reaction on post {}: {}",
                    post_id,
                    err
                );
                self.notices.publish(err.notice());
                Err(err)
            }
        }
    }

    /// Cached views currently showing this post's reaction state.
    fn reaction_view_keys(&self, post_id: &str) -> Vec<QueryKey> {
        let mut keys = self.cache.keys_matching(|key, value| match key {
            QueryKey::Post(id) => id == post_id,
            QueryKey::Posts(_) => value.contains_post(post_id),
            QueryKey::Reactions(id) => id == post_id,
            _ => false,
        });
        // Stable order for logs and snapshots
        keys.sort_by_key(|key| key.to_string());
        keys
    }

    /// The acting user's reaction as the cached views show it.
    fn cached_user_reaction(&self, post_id: &str, acting_user_id: &str) -> Option<ReactionType> {
        if let Some(CachedValue::Post(post)) = self.cache.get(&QueryKey::Post(post_id.to_string())) {
            return post.reactions.user_reaction_type();
        }

        let feeds = self.cache.keys_matching(|key, value| {
            matches!(key, QueryKey::Posts(_)) && value.contains_post(post_id)
        });
        for key in feeds {
            if let Some(CachedValue::Posts(posts)) = self.cache.get(&key) {
                if let Some(post) = posts.iter().find(|p| p.post.id == post_id) {
                    return post.reactions.user_reaction_type();
                }
            }
        }

        match self.cache.get(&QueryKey::Reactions(post_id.to_string())) {
            Some(CachedValue::Reactions(reactions)) => reactions
                .iter()
                .find(|r| r.user_id == acting_user_id)
                .map(|r| r.reaction_type),
            _ => None,
        }
    }

    fn apply_reaction_transition(
        &self,
        keys: &[QueryKey],
        post_id: &str,
        acting_user_id: &str,
        transition: &ReactionTransition,
    ) {
        for key in keys {
            self.cache.update(key, |value| match value {
                CachedValue::Post(post) => post.reactions.apply(transition),
                CachedValue::Posts(posts) => {
                    for post in posts.iter_mut().filter(|p| p.post.id == post_id) {
                        post.reactions.apply(transition);
                    }
                }
                CachedValue::Reactions(reactions) => {
                    apply_to_reaction_list(reactions, post_id, acting_user_id, transition)
                }
                CachedValue::Comments(_) => {}
            });
        }
    }

    /// Writes the toggle against the stored reaction, read fresh.
    async fn commit_reaction(
        &self,
        post_id: &str,
        reaction_type: ReactionType,
    ) -> Result<ReactionCommit> {
        let user_id = self.require_user_id().await?;

        let existing = self
            .store
            .select_maybe_single(
                Collection::Reactions,
                &Query::new()
                    .eq("post_id", post_id)
                    .eq("user_id", user_id.as_str()),
            )
            .await?;
        let existing: Option<Reaction> = existing.map(from_row).transpose()?;

        match existing {
            Some(reaction) if reaction.reaction_type == reaction_type => {
                self.store
                    .delete(
                        Collection::Reactions,
                        &[Filter::eq("id", reaction.id.as_str())],
                    )
                    .await?;
                Ok(ReactionCommit::Deleted(reaction))
            }
            Some(reaction) => {
                let updated = self
                    .store
                    .update(
                        Collection::Reactions,
                        &[Filter::eq("id", reaction.id.as_str())],
                        row(json!({ "type": reaction_type })),
                    )
                    .await?;
                let updated = updated
                    .into_iter()
                    .next()
                    .ok_or_else(|| FreePalError::NotFound(format!("reaction {}", reaction.id)))?;
                Ok(ReactionCommit::Updated(from_row(updated)?))
            }
            None => {
                let inserted = self
                    .store
                    .insert(
                        Collection::Reactions,
                        row(json!({
                            "post_id": post_id,
                            "user_id": user_id,
                            "type": reaction_type,
                        })),
                    )
                    .await
                    .map_err(|e| FreePalError::from_lookup(e, format!("post {}", post_id)))?;
                Ok(ReactionCommit::Inserted(from_row(inserted)?))
            }
        }
    }
}
