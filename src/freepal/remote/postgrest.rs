//! [`RemoteStore`] over the backend's PostgREST endpoint.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::RwLock;

use super::{Collection, Filter, Query, RemoteError, RemoteStore, Row};
use crate::freepal::error::{FreePalError, Result};

const URL_VAR: &str = "FREEPAL_BACKEND_URL";
const ANON_KEY_VAR: &str = "FREEPAL_BACKEND_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend, without the `/rest/v1` suffix
    pub url: String,

    /// Public (anonymous) API key sent with every request
    pub anon_key: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Reads the backend location from the environment, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let read = |name: &str| {
            std::env::var(name)
                .map_err(|_| FreePalError::Configuration(format!("{} is not set", name)))
        };

        Ok(Self::new(read(URL_VAR)?, read(ANON_KEY_VAR)?))
    }
}

pub struct PostgrestStore {
    client: reqwest::Client,
    config: RemoteConfig,
    access_token: RwLock<Option<String>>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl PostgrestStore {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            access_token: RwLock::new(None),
        }
    }

    /// Requests run as this user's session; `None` falls back to the anon key.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    fn request(&self, method: Method, collection: Collection) -> RequestBuilder {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| self.config.anon_key.clone());

        self.client
            .request(
                method,
                format!(
                    "{}/rest/v1/{}",
                    self.config.url.trim_end_matches('/'),
                    collection
                ),
            )
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Vec<Row>, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn list_item(value: &Value) -> String {
    let item = literal(value);
    if item.contains([',', '(', ')', '"']) {
        format!("\"{}\"", item.replace('"', "\\\""))
    } else {
        item
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| {
            let operand = match filter {
                Filter::Eq(_, value) => format!("eq.{}", literal(value)),
                Filter::In(_, values) => format!(
                    "in.({})",
                    values.iter().map(list_item).collect::<Vec<_>>().join(",")
                ),
                Filter::IsNull(_) => "is.null".to_string(),
                Filter::NotNull(_) => "not.is.null".to_string(),
            };
            (filter.column().to_string(), operand)
        })
        .collect()
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = filter_params(&query.filters);
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn error_from_response(status: StatusCode, body: &str) -> RemoteError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| body.to_string());

    match parsed.code.as_deref() {
        Some("23505") => RemoteError::UniqueViolation(message),
        Some("23503") => RemoteError::ForeignKeyViolation(message),
        Some("PGRST116") => RemoteError::NotFound,
        _ if status == StatusCode::NOT_FOUND => RemoteError::NotFound,
        _ => RemoteError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> std::result::Result<Vec<Row>, RemoteError> {
        let request = self
            .request(Method::GET, collection)
            .query(&query_params(query));
        self.send(request).await
    }

    async fn insert(&self, collection: Collection, row: Row) -> std::result::Result<Row, RemoteError> {
        let request = self
            .request(Method::POST, collection)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send(request)
            .await?
            .into_iter()
            .next()
            .ok_or(RemoteError::NotFound)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> std::result::Result<Vec<Row>, RemoteError> {
        let request = self
            .request(Method::PATCH, collection)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send(request).await
    }

    async fn delete(
        &self,
        collection: Collection,
        filters: &[Filter],
    ) -> std::result::Result<Vec<Row>, RemoteError> {
        let request = self
            .request(Method::DELETE, collection)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        self.send(request).await
    }
}
