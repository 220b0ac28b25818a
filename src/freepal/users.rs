use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::freepal::FreePal;
use crate::freepal::error::{FreePalError, Result};
use crate::freepal::remote::{Collection, Query, from_row, from_rows};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

impl UserRole {
    /// Site-wide moderators: may delete any comment.
    pub fn is_global_admin(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub bio: String,
    pub profile_picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The denormalised author fields carried by posts and comments.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthorSummary {
    pub username: String,
    pub profile_picture_url: Option<String>,
}

impl From<&User> for AuthorSummary {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            profile_picture_url: user.profile_picture_url.clone(),
        }
    }
}

impl FreePal {
    /// Resolves the acting user from the identity provider, fresh on every call.
    pub(crate) async fn require_user_id(&self) -> Result<String> {
        self.identity
            .current_user_id()
            .await?
            .ok_or(FreePalError::NotAuthenticated)
    }

    pub async fn fetch_user(&self, user_id: &str) -> Result<User> {
        let row = self
            .store
            .select_single(Collection::Users, &Query::new().eq("id", user_id))
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("user {}", user_id)))?;
        Ok(from_row(row)?)
    }

    /// Site-wide role of `user_id`; users without a profile row count as plain users.
    pub(crate) async fn global_role(&self, user_id: &str) -> Result<UserRole> {
        let row = self
            .store
            .select_maybe_single(Collection::Users, &Query::new().eq("id", user_id))
            .await?;
        match row {
            Some(row) => Ok(from_row::<User>(row)?.role),
            None => Ok(UserRole::User),
        }
    }

    /// Author summaries keyed by user id, for every id that has a profile.
    pub(crate) async fn author_summaries<'a>(
        &self,
        user_ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashMap<String, AuthorSummary>> {
        let mut ids: Vec<&str> = user_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self
            .store
            .select(Collection::Users, &Query::new().in_list("id", ids))
            .await?;
        let users: Vec<User> = from_rows(rows)?;

        Ok(users
            .iter()
            .map(|user| (user.id.clone(), AuthorSummary::from(user)))
            .collect())
    }
}
