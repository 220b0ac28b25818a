use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::freepal::FreePal;
use crate::freepal::error::Result;
use crate::freepal::remote::{Collection, Query, from_row, from_rows};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Community {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub is_public: bool,
    #[serde(default)]
    pub rules: String,
    pub slug: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The community fields a post card shows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommunitySummary {
    pub name: String,
    pub is_public: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunityRole {
    #[default]
    Member,
    Moderator,
    Admin,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Muted,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommunityMember {
    pub id: String,
    pub community_id: String,
    pub user_id: String,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(default)]
    pub role: CommunityRole,
    pub mute_expires_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl CommunityMember {
    pub fn can_moderate(&self) -> bool {
        matches!(self.role, CommunityRole::Moderator | CommunityRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == CommunityRole::Admin
    }

    pub fn is_approved(&self) -> bool {
        self.status == MemberStatus::Approved
    }
}

impl FreePal {
    pub(crate) async fn membership(
        &self,
        community_id: &str,
        user_id: &str,
    ) -> Result<Option<CommunityMember>> {
        let row = self
            .store
            .select_maybe_single(
                Collection::CommunityMembers,
                &Query::new()
                    .eq("community_id", community_id)
                    .eq("user_id", user_id),
            )
            .await?;
        Ok(row.map(from_row).transpose()?)
    }

    pub(crate) async fn approved_community_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let rows = self
            .store
            .select(
                Collection::CommunityMembers,
                &Query::new().eq("user_id", user_id).eq("status", "approved"),
            )
            .await?;
        let members: Vec<CommunityMember> = from_rows(rows)?;
        Ok(members.into_iter().map(|m| m.community_id).collect())
    }

    pub(crate) async fn public_community_ids(&self) -> Result<Vec<String>> {
        let rows = self
            .store
            .select(Collection::Communities, &Query::new().eq("is_public", true))
            .await?;
        let communities: Vec<Community> = from_rows(rows)?;
        Ok(communities.into_iter().map(|c| c.id).collect())
    }

    /// Summaries keyed by community id.
    pub(crate) async fn community_summaries(
        &self,
        community_ids: &HashSet<&str>,
    ) -> Result<HashMap<String, CommunitySummary>> {
        if community_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = self
            .store
            .select(
                Collection::Communities,
                &Query::new().in_list("id", community_ids.iter().copied()),
            )
            .await?;
        let communities: Vec<Community> = from_rows(rows)?;

        Ok(communities
            .into_iter()
            .map(|c| {
                (
                    c.id,
                    CommunitySummary {
                        name: c.name,
                        is_public: c.is_public,
                    },
                )
            })
            .collect())
    }
}
