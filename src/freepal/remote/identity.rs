use async_trait::async_trait;
use serde::Deserialize;
use std::sync::RwLock;

use super::RemoteError;
use super::postgrest::RemoteConfig;

/// Resolves the user the client is currently acting as.
///
/// Mutations call this right before they write, so a session that ended in
/// another tab is noticed instead of trusting whatever the UI rendered.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError>;
}

/// Identity held in memory; sign-in and sign-out are explicit calls.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user_id: RwLock<Option<String>>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError> {
        Ok(self
            .user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

/// Identity resolved from the backend's auth endpoint (`GET /auth/v1/user`).
pub struct RestIdentity {
    client: reqwest::Client,
    config: RemoteConfig,
    access_token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
}

impl RestIdentity {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            access_token: RwLock::new(None),
        }
    }

    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

#[async_trait]
impl IdentityProvider for RestIdentity {
    async fn current_user_id(&self) -> Result<Option<String>, RemoteError> {
        let token = self
            .access_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(token) = token else {
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.config.url.trim_end_matches('/')))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(user.id))
    }
}
