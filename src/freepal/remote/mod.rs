//! Remote data store boundary.
//!
//! The hosted backend is reached through a row-oriented interface: select,
//! insert, update and delete against named collections, filtered by equality
//! or membership on named fields. Rows travel as JSON objects and are turned
//! into domain types with the helpers at the bottom of this module.

mod identity;
mod memory;
mod postgrest;

pub use identity::{IdentityProvider, RestIdentity, StaticIdentity};
pub use memory::{InMemoryStore, StoreOperation};
pub use postgrest::{PostgrestStore, RemoteConfig};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// A single row as returned by the backend.
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Row not found")]
    NotFound,

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to decode row: {0}")]
    Decode(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

impl RemoteError {
    /// The referenced row (or the row it points at) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RemoteError::NotFound | RemoteError::ForeignKeyViolation(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Posts,
    Comments,
    Reactions,
    CommunityMembers,
    Communities,
    Users,
    ModeratorActions,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Posts,
        Collection::Comments,
        Collection::Reactions,
        Collection::CommunityMembers,
        Collection::Communities,
        Collection::Users,
        Collection::ModeratorActions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Comments => "comments",
            Collection::Reactions => "reactions",
            Collection::CommunityMembers => "community_members",
            Collection::Communities => "communities",
            Collection::Users => "users",
            Collection::ModeratorActions => "moderator_actions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn in_list<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _)
            | Filter::In(column, _)
            | Filter::IsNull(column)
            | Filter::NotNull(column) => column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let field = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, value) => field == value,
            Filter::In(_, values) => values.contains(field),
            Filter::IsNull(_) => field.is_null(),
            Filter::NotNull(_) => !field.is_null(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn in_list<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::in_list(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(Filter::IsNull(column.to_string()))
    }

    pub fn not_null(self, column: &str) -> Self {
        self.filter(Filter::NotNull(column.to_string()))
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

/// Row-oriented access to the hosted backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, RemoteError>;

    /// Inserts a row and returns it as stored (with generated columns filled in).
    async fn insert(&self, collection: Collection, row: Row) -> Result<Row, RemoteError>;

    /// Applies `patch` to every matching row and returns the updated rows.
    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, RemoteError>;

    /// Deletes every matching row and returns the deleted rows.
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, RemoteError>;

    /// Zero or one row; more than one match is reported as the first.
    async fn select_maybe_single(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Option<Row>, RemoteError> {
        let rows = self.select(collection, &query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Exactly one row, `NotFound` otherwise.
    async fn select_single(&self, collection: Collection, query: &Query) -> Result<Row, RemoteError> {
        self.select_maybe_single(collection, query)
            .await?
            .ok_or(RemoteError::NotFound)
    }
}

pub(crate) fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub(crate) fn to_row<T: Serialize>(value: &T) -> Result<Row, RemoteError> {
    match serde_json::to_value(value).map_err(|e| RemoteError::Decode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(RemoteError::Decode(format!("expected an object, got {}", other))),
    }
}

pub(crate) fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, RemoteError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| RemoteError::Decode(e.to_string()))
}

pub(crate) fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, RemoteError> {
    rows.into_iter().map(from_row).collect()
}

/// Reads a string column, if present.
pub(crate) fn str_field<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filters_match_rows() {
        let reaction = row(json!({
            "id": "r1",
            "post_id": "p1",
            "comment_id": null,
            "type": "like",
        }));

        assert!(Filter::eq("post_id", "p1").matches(&reaction));
        assert!(!Filter::eq("post_id", "p2").matches(&reaction));
        assert!(Filter::in_list("type", ["love", "like"]).matches(&reaction));
        assert!(Filter::IsNull("comment_id".to_string()).matches(&reaction));
        // Absent columns read as null
        assert!(Filter::IsNull("missing".to_string()).matches(&reaction));
        assert!(!Filter::NotNull("comment_id".to_string()).matches(&reaction));
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new()
            .eq("post_id", "p1")
            .not_null("author_id")
            .order_by("created_at", false)
            .limit(10);

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.limit, Some(10));
        assert_eq!(
            query.order,
            Some(Order {
                column: "created_at".to_string(),
                ascending: false
            })
        );
    }

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::CommunityMembers.as_str(), "community_members");
        assert_eq!(Collection::Reactions.to_string(), "reactions");
    }

    #[test]
    fn test_to_row_rejects_non_objects() {
        assert!(matches!(to_row(&vec![1, 2]), Err(RemoteError::Decode(_))));
    }
}
