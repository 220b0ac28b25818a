use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::freepal::FreePal;
use crate::freepal::communities::CommunitySummary;
use crate::freepal::error::{FreePalError, Result};
use crate::freepal::notices::Notice;
use crate::freepal::query_cache::{CachedValue, QueryKey, QueryScope};
use crate::freepal::reactions::{PostReactions, Reaction, UserReactionMarker};
use crate::freepal::remote::{Collection, Filter, Query, from_row, from_rows, row};
use crate::freepal::users::AuthorSummary;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    /// Visible to everyone
    #[default]
    Public,
    /// Only visible to the author
    Private,
    /// Follows the visibility of the post's community
    CommunityOnly,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Active,
    Removed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub community_id: Option<String>,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub visibility: PostVisibility,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post as feeds and the post page show it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostWithRelations {
    #[serde(flatten)]
    pub post: Post,
    pub author: AuthorSummary,
    pub community: Option<CommunitySummary>,
    pub reactions: PostReactions,
    pub comments: usize,
}

/// Which list of posts a feed shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostFeed {
    /// Posts written by the current user
    My,
    /// Personal public posts from everyone
    Public,
    /// Community posts from public communities and the user's own communities
    Communities,
    /// Posts in one community
    Community(String),
}

impl fmt::Display for PostFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PostFeed::My => f.write_str("my"),
            PostFeed::Public => f.write_str("public"),
            PostFeed::Communities => f.write_str("communities"),
            PostFeed::Community(id) => write!(f, "community:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePostInput {
    pub content: String,
    pub visibility: PostVisibility,
    pub community_id: Option<String>,
    /// Already-uploaded media
    pub media_urls: Vec<String>,
}

impl FreePal {
    /// Loads one post with its author, community and aggregates.
    ///
    /// Served from the cache while the cached entry is fresh.
    pub async fn fetch_post(&self, post_id: &str) -> Result<PostWithRelations> {
        let key = QueryKey::Post(post_id.to_string());
        if let Some(CachedValue::Post(post)) = self.cache.get_fresh(&key) {
            return Ok(post);
        }

        let user_id = self.require_user_id().await?;
        let row = self
            .store
            .select_single(Collection::Posts, &Query::new().eq("id", post_id))
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("post {}", post_id)))?;
        let post: Post = from_row(row)?;

        let mut loaded = self.attach_post_relations(vec![post], &user_id).await?;
        let post = loaded
            .pop()
            .ok_or_else(|| FreePalError::NotFound(format!("post {}", post_id)))?;

        self.cache.set(key, CachedValue::Post(post.clone()));
        Ok(post)
    }

    /// Loads the newest posts of `feed`, up to the configured page size.
    ///
    /// # Arguments
    ///
    /// * `feed` - Which feed to load. [`PostFeed::Communities`] covers
    ///   community-only posts in public communities and in every community the
    ///   user is an approved member of.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` when nobody is signed in.
    pub async fn fetch_posts(&self, feed: PostFeed) -> Result<Vec<PostWithRelations>> {
        let key = QueryKey::Posts(feed.clone());
        if let Some(CachedValue::Posts(posts)) = self.cache.get_fresh(&key) {
            return Ok(posts);
        }

        let user_id = self.require_user_id().await?;
        let query = match &feed {
            PostFeed::My => Query::new().eq("author_id", user_id.as_str()),
            PostFeed::Public => Query::new().eq("visibility", "public"),
            PostFeed::Communities => {
                let mut community_ids = self.public_community_ids().await?;
                community_ids.extend(self.approved_community_ids(&user_id).await?);
                community_ids.sort_unstable();
                community_ids.dedup();

                Query::new()
                    .eq("visibility", "community_only")
                    .not_null("community_id")
                    .in_list("community_id", community_ids)
            }
            PostFeed::Community(community_id) => {
                Query::new().eq("community_id", community_id.as_str())
            }
        };

        let rows = self
            .store
            .select(
                Collection::Posts,
                &query
                    .order_by("created_at", false)
                    .limit(self.config.feed_page_size),
            )
            .await?;
        let posts: Vec<Post> = from_rows(rows)?;

        tracing::debug!(
            target: "freepal::posts::fetch_posts",
            "Loaded {} posts for feed {}",
            posts.len(),
            feed
        );

        let posts = self.attach_post_relations(posts, &user_id).await?;
        self.cache.set(key, CachedValue::Posts(posts.clone()));
        Ok(posts)
    }

    /// All reactions on a post.
    pub async fn fetch_post_reactions(&self, post_id: &str) -> Result<Vec<Reaction>> {
        let key = QueryKey::Reactions(post_id.to_string());
        if let Some(CachedValue::Reactions(reactions)) = self.cache.get_fresh(&key) {
            return Ok(reactions);
        }

        let rows = self
            .store
            .select(Collection::Reactions, &Query::new().eq("post_id", post_id))
            .await?;
        let reactions: Vec<Reaction> = from_rows(rows)?;

        self.cache.set(key, CachedValue::Reactions(reactions.clone()));
        Ok(reactions)
    }

    pub async fn create_post(&self, input: CreatePostInput) -> Result<Post> {
        let author_id = self.require_user_id().await?;

        let community_id = match input.visibility {
            PostVisibility::CommunityOnly => Some(input.community_id.ok_or_else(|| {
                FreePalError::Validation(
                    "community id is required for community-only posts".to_string(),
                )
            })?),
            _ => None,
        };
        if input.content.trim().is_empty() && input.media_urls.is_empty() {
            return Err(FreePalError::Validation(
                "a post needs content or media".to_string(),
            ));
        }

        let inserted = self
            .store
            .insert(
                Collection::Posts,
                row(json!({
                    "content": input.content,
                    "visibility": input.visibility,
                    "author_id": author_id,
                    "community_id": community_id,
                    "media_urls": input.media_urls,
                    // Community posts wait for a moderator
                    "is_approved": input.visibility != PostVisibility::CommunityOnly,
                    "status": PostStatus::Active,
                })),
            )
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => FreePalError::NotFound("community".to_string()),
                e => FreePalError::Remote(e),
            })?;
        let post: Post = from_row(inserted)?;

        self.cache.invalidate_scope(QueryScope::Posts);
        tracing::info!(
            target: "freepal::posts::create_post",
            "Created post {} ({:?})",
            post.id,
            post.visibility
        );
        self.notices.publish(Notice::success(
            "Post created!",
            "Your post has been published successfully.",
        ));

        Ok(post)
    }

    /// Deletes a post together with its comments and reactions.
    ///
    /// Only the author or a site admin may delete a post.
    pub async fn delete_post(&self, post_id: &str) -> Result<Post> {
        let user_id = self.require_user_id().await?;

        let existing = self
            .store
            .select_single(Collection::Posts, &Query::new().eq("id", post_id))
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("post {}", post_id)))?;
        let existing: Post = from_row(existing)?;
        if existing.author_id != user_id && !self.global_role(&user_id).await?.is_global_admin() {
            return Err(FreePalError::NotAuthorized(
                "only the author can delete this post".to_string(),
            ));
        }

        let deleted = self
            .store
            .delete(Collection::Posts, &[Filter::eq("id", post_id)])
            .await?;
        let deleted: Post = deleted
            .into_iter()
            .next()
            .map(from_row)
            .transpose()?
            .ok_or_else(|| FreePalError::NotFound(format!("post {}", post_id)))?;

        self.cache.invalidate_scope(QueryScope::Posts);
        self.cache.invalidate(&QueryKey::Post(post_id.to_string()));
        self.cache.invalidate(&QueryKey::Comments(post_id.to_string()));
        self.cache.invalidate(&QueryKey::Reactions(post_id.to_string()));

        tracing::info!(target: "freepal::posts::delete_post", "Deleted post {}", post_id);
        Ok(deleted)
    }

    /// Joins authors, communities, reaction and comment aggregates onto `posts`.
    async fn attach_post_relations(
        &self,
        posts: Vec<Post>,
        user_id: &str,
    ) -> Result<Vec<PostWithRelations>> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }

        let post_ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        let authors = self
            .author_summaries(posts.iter().map(|p| p.author_id.as_str()))
            .await?;
        let community_ids: HashSet<&str> = posts
            .iter()
            .filter_map(|p| p.community_id.as_deref())
            .collect();
        let communities = self.community_summaries(&community_ids).await?;

        let reaction_rows = self
            .store
            .select(
                Collection::Reactions,
                &Query::new().in_list("post_id", post_ids.iter().copied()),
            )
            .await?;
        let reactions: Vec<Reaction> = from_rows(reaction_rows)?;

        let comment_rows = self
            .store
            .select(
                Collection::Comments,
                &Query::new().in_list("post_id", post_ids.iter().copied()),
            )
            .await?;

        let mut reaction_counts: HashMap<&str, usize> = HashMap::new();
        let mut user_reactions: HashMap<&str, UserReactionMarker> = HashMap::new();
        for reaction in &reactions {
            let Some(post_id) = reaction.post_id.as_deref() else {
                continue;
            };
            *reaction_counts.entry(post_id).or_default() += 1;
            if reaction.user_id == user_id {
                user_reactions.insert(
                    post_id,
                    UserReactionMarker {
                        reaction_type: reaction.reaction_type,
                    },
                );
            }
        }

        let mut comment_counts: HashMap<String, usize> = HashMap::new();
        for comment in &comment_rows {
            if let Some(post_id) = comment.get("post_id").and_then(|v| v.as_str()) {
                *comment_counts.entry(post_id.to_string()).or_default() += 1;
            }
        }

        Ok(posts
            .into_iter()
            .map(|post| {
                let id = post.id.as_str();
                let reactions = PostReactions {
                    count: reaction_counts.get(id).copied().unwrap_or(0),
                    user_reaction: user_reactions.get(id).copied(),
                };
                let comments = comment_counts.get(id).copied().unwrap_or(0);
                let author = authors.get(&post.author_id).cloned().unwrap_or_default();
                let community = post
                    .community_id
                    .as_ref()
                    .and_then(|cid| communities.get(cid).cloned());

                PostWithRelations {
                    post,
                    author,
                    community,
                    reactions,
                    comments,
                }
            })
            .collect())
    }
}
