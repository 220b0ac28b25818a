//! In-process implementation of [`RemoteStore`].
//!
//! Mirrors the pieces of the hosted schema the client relies on: generated ids
//! and timestamps, unique `(post_id, user_id)` reactions, unique memberships,
//! and foreign keys. Failures can be injected one operation at a time, and
//! every committed write is published on an attached [`ChangeFeed`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Collection, Filter, Query, RemoteError, RemoteStore, Row};
use crate::freepal::realtime::{ChangeEvent, ChangeFeed, ChangeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Select,
    Insert,
    Update,
    Delete,
}

struct ForeignKey {
    column: &'static str,
    references: Collection,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<Collection, Vec<Row>>>,
    failures: Mutex<HashMap<(Collection, StoreOperation), RemoteError>>,
    operations: Mutex<Vec<(Collection, StoreOperation)>>,
    latency: Mutex<Option<Duration>>,
    change_feed: Option<Arc<ChangeFeed>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every committed write on `feed`.
    pub fn with_change_feed(feed: Arc<ChangeFeed>) -> Self {
        Self {
            change_feed: Some(feed),
            ..Self::default()
        }
    }

    /// Makes the next `operation` on `collection` fail with `error`.
    pub fn fail_next(&self, collection: Collection, operation: StoreOperation, error: RemoteError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((collection, operation), error);
    }

    /// Delays every operation, to exercise overlapping requests.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Operations served so far, in order.
    pub fn operations(&self) -> Vec<(Collection, StoreOperation)> {
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of rows currently stored in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    async fn begin(&self, collection: Collection, operation: StoreOperation) -> Result<(), RemoteError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((collection, operation));

        let injected = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(collection, operation));
        match injected {
            Some(error) => {
                tracing::debug!(
                    target: "freepal::remote::memory",
                    "Injected failure for {:?} on {}: {}",
                    operation,
                    collection,
                    error
                );
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(feed) = &self.change_feed {
            feed.emit(event);
        }
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn timestamp_columns(collection: Collection) -> (&'static [&'static str], Option<&'static str>) {
    // (filled on insert, refreshed on update)
    match collection {
        Collection::Posts | Collection::Comments | Collection::Communities | Collection::Users => {
            (&["created_at", "updated_at"], Some("updated_at"))
        }
        Collection::Reactions | Collection::ModeratorActions => (&["created_at"], None),
        Collection::CommunityMembers => (&["joined_at"], None),
    }
}

fn unique_keys(collection: Collection) -> &'static [&'static [&'static str]] {
    match collection {
        Collection::Reactions => &[&["id"], &["post_id", "user_id"]],
        Collection::CommunityMembers => &[&["id"], &["community_id", "user_id"]],
        Collection::Users => &[&["id"], &["username"]],
        Collection::Communities => &[&["id"], &["slug"]],
        _ => &[&["id"]],
    }
}

fn foreign_keys(collection: Collection) -> &'static [ForeignKey] {
    match collection {
        Collection::Posts => &[
            ForeignKey {
                column: "author_id",
                references: Collection::Users,
            },
            ForeignKey {
                column: "community_id",
                references: Collection::Communities,
            },
        ],
        Collection::Comments => &[
            ForeignKey {
                column: "post_id",
                references: Collection::Posts,
            },
            ForeignKey {
                column: "author_id",
                references: Collection::Users,
            },
            ForeignKey {
                column: "parent_comment_id",
                references: Collection::Comments,
            },
        ],
        Collection::Reactions => &[
            ForeignKey {
                column: "post_id",
                references: Collection::Posts,
            },
            ForeignKey {
                column: "comment_id",
                references: Collection::Comments,
            },
            ForeignKey {
                column: "user_id",
                references: Collection::Users,
            },
        ],
        Collection::CommunityMembers => &[
            ForeignKey {
                column: "community_id",
                references: Collection::Communities,
            },
            ForeignKey {
                column: "user_id",
                references: Collection::Users,
            },
        ],
        _ => &[],
    }
}

fn find_by_id<'a>(tables: &'a HashMap<Collection, Vec<Row>>, collection: Collection, id: &Value) -> Option<&'a Row> {
    tables
        .get(&collection)
        .and_then(|rows| rows.iter().find(|row| row.get("id") == Some(id)))
}

/// Checks unique and foreign keys for `candidate`, ignoring the row at `skip`.
fn check_constraints(
    tables: &HashMap<Collection, Vec<Row>>,
    collection: Collection,
    candidate: &Row,
    skip: Option<usize>,
) -> Result<(), RemoteError> {
    let existing = tables.get(&collection).map(Vec::as_slice).unwrap_or(&[]);

    for key in unique_keys(collection) {
        let values: Vec<&Value> = key
            .iter()
            .map(|column| candidate.get(*column).unwrap_or(&Value::Null))
            .collect();
        if values.iter().any(|value| value.is_null()) {
            continue;
        }
        let clash = existing.iter().enumerate().any(|(index, row)| {
            Some(index) != skip
                && key
                    .iter()
                    .zip(&values)
                    .all(|(column, value)| row.get(*column) == Some(*value))
        });
        if clash {
            return Err(RemoteError::UniqueViolation(format!(
                "{}_{}_key",
                collection,
                key.join("_")
            )));
        }
    }

    for foreign_key in foreign_keys(collection) {
        let Some(value) = candidate.get(foreign_key.column).filter(|v| !v.is_null()) else {
            continue;
        };
        let Some(target) = find_by_id(tables, foreign_key.references, value) else {
            return Err(RemoteError::ForeignKeyViolation(format!(
                "{}_{}_fkey",
                collection, foreign_key.column
            )));
        };

        // A reply must stay on the post of the comment it answers.
        if collection == Collection::Comments
            && foreign_key.column == "parent_comment_id"
            && target.get("post_id") != candidate.get("post_id")
        {
            return Err(RemoteError::ForeignKeyViolation(
                "comments_parent_same_post".to_string(),
            ));
        }
    }

    Ok(())
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => {
            match (
                DateTime::parse_from_rfc3339(a),
                DateTime::parse_from_rfc3339(b),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, RemoteError> {
        self.begin(collection, StoreOperation::Select).await?;

        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Row> = tables
            .get(&collection)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();
        drop(tables);

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn insert(&self, collection: Collection, mut row: Row) -> Result<Row, RemoteError> {
        self.begin(collection, StoreOperation::Insert).await?;

        if row.get("id").is_none_or(Value::is_null) {
            row.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        let (filled, _) = timestamp_columns(collection);
        for column in filled {
            if row.get(*column).is_none_or(Value::is_null) {
                row.insert(column.to_string(), now());
            }
        }

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        check_constraints(&tables, collection, &row, None)?;
        tables.entry(collection).or_default().push(row.clone());
        drop(tables);

        self.emit(ChangeEvent {
            collection,
            kind: ChangeKind::Insert,
            new: Some(row.clone()),
            old: None,
        });

        Ok(row)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, RemoteError> {
        self.begin(collection, StoreOperation::Update).await?;

        let (_, refreshed) = timestamp_columns(collection);
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());

        let matching: Vec<usize> = tables
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .enumerate()
                    .filter(|(_, row)| filters.iter().all(|f| f.matches(row)))
                    .map(|(index, _)| index)
                    .collect()
            })
            .unwrap_or_default();

        if matching.is_empty() {
            return Ok(Vec::new());
        }

        // Patch every match first, then validate against the patched table so
        // a failure leaves the stored rows untouched.
        let original = tables.get(&collection).cloned().unwrap_or_default();
        let mut staged = original.clone();
        let mut changes = Vec::with_capacity(matching.len());
        for &index in &matching {
            let old = staged[index].clone();
            let mut new = old.clone();
            for (column, value) in &patch {
                new.insert(column.clone(), value.clone());
            }
            if let Some(column) = refreshed {
                if !patch.contains_key(column) {
                    new.insert(column.to_string(), now());
                }
            }
            staged[index] = new.clone();
            changes.push((old, new));
        }

        tables.insert(collection, staged);
        for (&index, (_, new)) in matching.iter().zip(&changes) {
            if let Err(err) = check_constraints(&tables, collection, new, Some(index)) {
                tables.insert(collection, original);
                return Err(err);
            }
        }
        drop(tables);

        let mut updated = Vec::with_capacity(changes.len());
        for (old, new) in changes {
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Update,
                new: Some(new.clone()),
                old: Some(old),
            });
            updated.push(new);
        }

        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, RemoteError> {
        self.begin(collection, StoreOperation::Delete).await?;

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables.entry(collection).or_default();
        let (deleted, kept): (Vec<Row>, Vec<Row>) = rows
            .drain(..)
            .partition(|row| filters.iter().all(|f| f.matches(row)));
        *rows = kept;

        // Comments and reactions go with their post; replies keep pointing at
        // a deleted parent.
        let mut cascaded = Vec::new();
        if collection == Collection::Posts && !deleted.is_empty() {
            let ids: Vec<Value> = deleted.iter().filter_map(|row| row.get("id").cloned()).collect();
            for dependent in [Collection::Comments, Collection::Reactions] {
                let rows = tables.entry(dependent).or_default();
                let (gone, kept): (Vec<Row>, Vec<Row>) = rows
                    .drain(..)
                    .partition(|row| row.get("post_id").is_some_and(|id| ids.contains(id)));
                *rows = kept;
                cascaded.extend(gone.into_iter().map(|row| (dependent, row)));
            }
        }
        drop(tables);

        for row in &deleted {
            self.emit(ChangeEvent {
                collection,
                kind: ChangeKind::Delete,
                new: None,
                old: Some(row.clone()),
            });
        }
        for (dependent, row) in cascaded {
            self.emit(ChangeEvent {
                collection: dependent,
                kind: ChangeKind::Delete,
                new: None,
                old: Some(row),
            });
        }

        Ok(deleted)
    }
}
