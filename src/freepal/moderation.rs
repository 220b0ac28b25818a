use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::freepal::FreePal;
use crate::freepal::comments::Comment;
use crate::freepal::error::{FreePalError, Result};
use crate::freepal::notices::Notice;
use crate::freepal::posts::Post;
use crate::freepal::query_cache::{QueryKey, QueryScope};
use crate::freepal::remote::{Collection, Filter, Query, from_row, row};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModeratorActionKind {
    Warn,
    Mute,
    RemovePost,
    RemoveComment,
}

impl ModeratorActionKind {
    fn success_title(&self) -> &'static str {
        match self {
            ModeratorActionKind::Warn => "Warning issued successfully",
            ModeratorActionKind::Mute => "User muted successfully",
            ModeratorActionKind::RemovePost => "Post removed successfully",
            ModeratorActionKind::RemoveComment => "Comment removed successfully",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModeratorAction {
    pub id: String,
    pub community_id: String,
    pub moderator_id: String,
    pub target_user_id: String,
    pub action_type: ModeratorActionKind,
    pub reason: String,
    pub duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeratorActionRequest {
    pub community_id: String,
    pub target_user_id: String,
    pub action: ModeratorActionKind,
    pub reason: String,
    /// Hours; required for mutes
    pub duration_hours: Option<u32>,
    /// Post or comment id; required for removals
    pub content_id: Option<String>,
}

impl FreePal {
    /// Records a moderator action in a community and applies its effect.
    ///
    /// # Arguments
    ///
    /// * `request` - The community, the member being acted on, the action and
    ///   its parameters. Removals need `content_id`; mutes need `duration_hours`.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` unless the acting user moderates or administers the
    /// community, or when the removed content belongs to another community.
    /// `NotFound` when the content does not exist. `Validation` when a required
    /// parameter is missing or the mute duration is out of range.
    pub async fn take_moderator_action(
        &self,
        request: ModeratorActionRequest,
    ) -> Result<ModeratorAction> {
        let moderator_id = self.require_user_id().await?;

        let member = self
            .membership(&request.community_id, &moderator_id)
            .await?;
        if !member.is_some_and(|m| m.can_moderate()) {
            return Err(FreePalError::NotAuthorized(
                "only moderators and admins can moderate this community".to_string(),
            ));
        }

        let content_id = match request.action {
            ModeratorActionKind::RemovePost | ModeratorActionKind::RemoveComment => Some(
                request
                    .content_id
                    .clone()
                    .ok_or_else(|| FreePalError::Validation("content id is required for removals".to_string()))?,
            ),
            _ => None,
        };

        // Zero hours counts as no duration
        let duration_hours = request.duration_hours.filter(|hours| *hours > 0);
        if request.action == ModeratorActionKind::Mute && duration_hours.is_none() {
            return Err(FreePalError::Validation(
                "duration is required for mute actions".to_string(),
            ));
        }
        let expires_at = duration_hours.map(mute_expiry).transpose()?;
        let expires_at_value = expires_at.map(|at| at.to_rfc3339_opts(SecondsFormat::Micros, true));

        // The removed content must belong to the moderated community
        let removal_post_id = match (request.action, content_id.as_deref()) {
            (ModeratorActionKind::RemovePost, Some(post_id)) => {
                self.post_in_community(post_id, &request.community_id).await?;
                Some(post_id.to_string())
            }
            (ModeratorActionKind::RemoveComment, Some(comment_id)) => {
                let comment = self
                    .store
                    .select_single(Collection::Comments, &Query::new().eq("id", comment_id))
                    .await
                    .map_err(|e| FreePalError::from_lookup(e, format!("comment {}", comment_id)))?;
                let comment: Comment = from_row(comment)?;
                self.post_in_community(&comment.post_id, &request.community_id)
                    .await?;
                Some(comment.post_id)
            }
            _ => None,
        };

        let recorded = self
            .store
            .insert(
                Collection::ModeratorActions,
                row(json!({
                    "community_id": request.community_id,
                    "moderator_id": moderator_id,
                    "target_user_id": request.target_user_id,
                    "action_type": request.action,
                    "reason": request.reason,
                    "duration": duration_hours,
                    "expires_at": expires_at_value,
                })),
            )
            .await?;
        let action: ModeratorAction = from_row(recorded)?;

        match (request.action, content_id, removal_post_id) {
            (ModeratorActionKind::RemovePost, Some(post_id), _) => {
                self.store
                    .update(
                        Collection::Posts,
                        &[Filter::eq("id", post_id.as_str())],
                        row(json!({"status": "removed"})),
                    )
                    .await?;
                self.cache.invalidate(&QueryKey::Post(post_id));
                self.cache.invalidate_scope(QueryScope::Posts);
            }
            (ModeratorActionKind::RemoveComment, Some(comment_id), Some(post_id)) => {
                self.store
                    .update(
                        Collection::Comments,
                        &[Filter::eq("id", comment_id.as_str())],
                        row(json!({"status": "removed"})),
                    )
                    .await?;
                self.cache.invalidate(&QueryKey::Comments(post_id));
            }
            (ModeratorActionKind::Mute, _, _) => {
                self.store
                    .update(
                        Collection::CommunityMembers,
                        &[
                            Filter::eq("community_id", request.community_id.as_str()),
                            Filter::eq("user_id", request.target_user_id.as_str()),
                        ],
                        row(json!({
                            "status": "muted",
                            "mute_expires_at": expires_at_value,
                        })),
                    )
                    .await?;
            }
            _ => {}
        }
        self.cache
            .invalidate(&QueryKey::Community(request.community_id.clone()));

        tracing::info!(
            target: "freepal::moderation::take_moderator_action",
            "{:?} on {} in community {} by {}",
            request.action,
            request.target_user_id,
            request.community_id,
            moderator_id
        );
        self.notices
            .publish(Notice::success(request.action.success_title(), request.reason));

        Ok(action)
    }

    /// Fails unless `post_id` exists and was posted in `community_id`.
    async fn post_in_community(&self, post_id: &str, community_id: &str) -> Result<()> {
        let post = self
            .store
            .select_single(Collection::Posts, &Query::new().eq("id", post_id))
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("post {}", post_id)))?;
        let post: Post = from_row(post)?;

        if post.community_id.as_deref() != Some(community_id) {
            return Err(FreePalError::NotAuthorized(
                "content is not part of this community".to_string(),
            ));
        }
        Ok(())
    }
}

fn mute_expiry(hours: u32) -> Result<DateTime<Utc>> {
    TimeDelta::try_hours(i64::from(hours))
        .and_then(|duration| Utc::now().checked_add_signed(duration))
        .ok_or_else(|| FreePalError::Validation(format!("duration of {} hours is too long", hours)))
}
