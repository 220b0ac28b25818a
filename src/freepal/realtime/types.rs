//! Types for backend change notifications.

use serde::{Deserialize, Serialize};

use crate::freepal::query_cache::{QueryKey, QueryScope};
use crate::freepal::remote::{Collection, Row, str_field};

/// Which kind of write produced a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change on a collection.
///
/// `new` is absent for deletes and `old` is absent for inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub new: Option<Row>,
    pub old: Option<Row>,
}

impl ChangeEvent {
    /// The row to read keys from: `new`, or `old` for deletes.
    pub fn record(&self) -> Option<&Row> {
        self.new.as_ref().or(self.old.as_ref())
    }

    fn field(&self, column: &str) -> Option<&str> {
        self.record().and_then(|row| str_field(row, column))
    }
}

/// What to mark stale in the query cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(QueryKey),
    Scope(QueryScope),
}

/// Maps a change to the cached queries that may now be out of date.
pub fn invalidations_for(event: &ChangeEvent) -> Vec<Invalidation> {
    let is_insert = event.kind == ChangeKind::Insert;
    let mut invalidations = Vec::new();

    match event.collection {
        Collection::Posts => {
            invalidations.push(Invalidation::Scope(QueryScope::Posts));
            if !is_insert {
                if let Some(id) = event.field("id") {
                    invalidations.push(Invalidation::Key(QueryKey::Post(id.to_string())));
                }
            }
        }
        Collection::Reactions => {
            invalidations.push(Invalidation::Scope(QueryScope::Posts));
            if let Some(post_id) = event.field("post_id") {
                invalidations.push(Invalidation::Key(QueryKey::Post(post_id.to_string())));
                invalidations.push(Invalidation::Key(QueryKey::Reactions(post_id.to_string())));
            }
        }
        Collection::Comments => {
            if let Some(post_id) = event.field("post_id") {
                invalidations.push(Invalidation::Key(QueryKey::Comments(post_id.to_string())));
                invalidations.push(Invalidation::Key(QueryKey::Post(post_id.to_string())));
            }
            invalidations.push(Invalidation::Scope(QueryScope::Posts));
        }
        Collection::Users => {
            invalidations.push(Invalidation::Key(QueryKey::Users));
            if !is_insert {
                if let Some(username) = event.field("username") {
                    invalidations.push(Invalidation::Key(QueryKey::User(username.to_string())));
                }
            }
        }
        Collection::Communities => {
            invalidations.push(Invalidation::Key(QueryKey::Communities));
            if !is_insert {
                if let Some(id) = event.field("id") {
                    invalidations.push(Invalidation::Key(QueryKey::Community(id.to_string())));
                }
            }
        }
        Collection::CommunityMembers => {
            invalidations.push(Invalidation::Key(QueryKey::Communities));
            if let Some(community_id) = event.field("community_id") {
                invalidations.push(Invalidation::Key(QueryKey::Community(
                    community_id.to_string(),
                )));
            }
        }
        Collection::ModeratorActions => {}
    }

    invalidations
}
