use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::freepal::FreePal;
use crate::freepal::comment_tree::{CommentNode, ExpansionState, ThreadView, build_comment_tree};
use crate::freepal::error::{FreePalError, Result};
use crate::freepal::posts::{Post, PostVisibility};
use crate::freepal::query_cache::{CachedValue, QueryKey, QueryScope};
use crate::freepal::remote::{Collection, Filter, Query, from_row, from_rows, row};
use crate::freepal::users::AuthorSummary;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    #[default]
    Active,
    Removed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    #[serde(default)]
    pub media_urls: Vec<String>,
    pub parent_comment_id: Option<String>,
    #[serde(default)]
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub author: AuthorSummary,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_comment_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: String,
    pub content: String,
    /// Already-uploaded media
    pub media_urls: Vec<String>,
    pub parent_comment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEdit {
    pub post_id: String,
    pub comment_id: String,
    pub content: String,
    /// Existing media the author kept
    pub kept_media_urls: Vec<String>,
    /// Media uploaded with this edit
    pub new_media_urls: Vec<String>,
}

impl FreePal {
    /// A post's comments with their authors, newest first.
    pub async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let key = QueryKey::Comments(post_id.to_string());
        if let Some(CachedValue::Comments(comments)) = self.cache.get_fresh(&key) {
            return Ok(comments);
        }

        self.require_user_id().await?;
        let rows = self
            .store
            .select(
                Collection::Comments,
                &Query::new()
                    .eq("post_id", post_id)
                    .order_by("created_at", false),
            )
            .await?;
        let mut comments: Vec<Comment> = from_rows(rows)?;

        let authors = self
            .author_summaries(comments.iter().map(|c| c.author_id.as_str()))
            .await?;
        for comment in &mut comments {
            if let Some(author) = authors.get(&comment.author_id) {
                comment.author = author.clone();
            }
        }

        self.cache.set(key, CachedValue::Comments(comments.clone()));
        Ok(comments)
    }

    /// The post's comments as a reply forest.
    pub async fn comment_tree(&self, post_id: &str) -> Result<Vec<CommentNode>> {
        let comments = self.fetch_comments(post_id).await?;
        Ok(build_comment_tree(&comments))
    }

    /// The post's comment thread as it should be rendered for `expansion`.
    pub async fn thread_view(&self, post_id: &str, expansion: &ExpansionState) -> Result<ThreadView> {
        let roots = self.comment_tree(post_id).await?;
        Ok(ThreadView::new(&roots, expansion, &self.config.thread_view))
    }

    /// Adds a comment or a reply to a post.
    ///
    /// # Arguments
    ///
    /// * `new_comment` - The post, the text and media, and the comment being
    ///   replied to, if any. The parent must belong to the same post.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` for private posts of other users and for community posts
    /// when the user is not an approved member. `Validation` for empty comments.
    pub async fn add_comment(&self, new_comment: NewComment) -> Result<Comment> {
        let author_id = self.require_user_id().await?;

        if new_comment.content.trim().is_empty() && new_comment.media_urls.is_empty() {
            return Err(FreePalError::Validation(
                "a comment needs content or media".to_string(),
            ));
        }

        let post = self
            .store
            .select_single(
                Collection::Posts,
                &Query::new().eq("id", new_comment.post_id.as_str()),
            )
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("post {}", new_comment.post_id)))?;
        let post: Post = from_row(post)?;

        if post.visibility == PostVisibility::Private && post.author_id != author_id {
            return Err(FreePalError::NotAuthorized(
                "cannot comment on private posts".to_string(),
            ));
        }
        if post.visibility == PostVisibility::CommunityOnly {
            if let Some(community_id) = post.community_id.as_deref() {
                let member = self.membership(community_id, &author_id).await?;
                if !member.is_some_and(|m| m.is_approved()) {
                    return Err(FreePalError::NotAuthorized(
                        "you must be a community member to comment on this post".to_string(),
                    ));
                }
            }
        }

        if let Some(parent_id) = new_comment.parent_comment_id.as_deref() {
            let parent = self
                .store
                .select_single(Collection::Comments, &Query::new().eq("id", parent_id))
                .await
                .map_err(|e| FreePalError::from_lookup(e, format!("comment {}", parent_id)))?;
            let parent: Comment = from_row(parent)?;
            if parent.post_id != post.id {
                return Err(FreePalError::Validation(
                    "a reply must be on the same post as its parent".to_string(),
                ));
            }
        }

        let inserted = self
            .store
            .insert(
                Collection::Comments,
                row(json!({
                    "post_id": new_comment.post_id,
                    "author_id": author_id,
                    "content": new_comment.content,
                    "media_urls": new_comment.media_urls,
                    "parent_comment_id": new_comment.parent_comment_id,
                    "status": CommentStatus::Active,
                })),
            )
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("post {}", new_comment.post_id)))?;
        let mut comment: Comment = from_row(inserted)?;
        if let Some(author) = self.author_summaries([author_id.as_str()]).await?.remove(&author_id) {
            comment.author = author;
        }

        self.invalidate_comment_views(&comment.post_id);
        tracing::info!(
            target: "freepal::comments::add_comment",
            "Added comment {} to post {}",
            comment.id,
            comment.post_id
        );

        Ok(comment)
    }

    /// Edits a comment's text and media. Only the author may edit.
    pub async fn update_comment(&self, edit: CommentEdit) -> Result<Comment> {
        let user_id = self.require_user_id().await?;

        let existing = self.find_comment(&edit.comment_id).await?;
        if existing.author_id != user_id {
            return Err(FreePalError::NotAuthorized(
                "only the author can edit this comment".to_string(),
            ));
        }

        let media_urls: Vec<String> = edit
            .kept_media_urls
            .iter()
            .chain(&edit.new_media_urls)
            .cloned()
            .collect();

        let updated = self
            .store
            .update(
                Collection::Comments,
                &[Filter::eq("id", edit.comment_id.as_str())],
                row(json!({
                    "content": edit.content,
                    "media_urls": media_urls,
                })),
            )
            .await?;
        let mut comment: Comment = updated
            .into_iter()
            .next()
            .map(from_row)
            .transpose()?
            .ok_or_else(|| FreePalError::NotFound(format!("comment {}", edit.comment_id)))?;
        if let Some(author) = self.author_summaries([user_id.as_str()]).await?.remove(&user_id) {
            comment.author = author;
        }

        self.invalidate_comment_views(&edit.post_id);
        Ok(comment)
    }

    /// Hard-deletes a comment.
    ///
    /// Allowed for the author, an admin of the community the post belongs
    /// to, or a site admin. `community_id` is only honoured when it names
    /// that same community. Replies stay and show up as top-level comments
    /// afterwards.
    ///
    /// # Errors
    ///
    /// `NotFound` when the comment does not exist or belongs to another post.
    pub async fn delete_comment(
        &self,
        post_id: &str,
        comment_id: &str,
        community_id: Option<&str>,
    ) -> Result<()> {
        let user_id = self.require_user_id().await?;

        let comment = self.find_comment(comment_id).await?;
        if comment.post_id != post_id {
            return Err(FreePalError::NotFound(format!(
                "comment {} on post {}",
                comment_id, post_id
            )));
        }

        let is_author = comment.author_id == user_id;
        let is_community_admin = if is_author {
            false
        } else {
            let post = self
                .store
                .select_single(Collection::Posts, &Query::new().eq("id", post_id))
                .await
                .map_err(|e| FreePalError::from_lookup(e, format!("post {}", post_id)))?;
            let post: Post = from_row(post)?;
            match post.community_id.as_deref() {
                Some(owner) if community_id.is_none_or(|claimed| claimed == owner) => self
                    .membership(owner, &user_id)
                    .await?
                    .is_some_and(|m| m.is_admin()),
                _ => false,
            }
        };
        let is_global_admin = !is_author
            && !is_community_admin
            && self.global_role(&user_id).await?.is_global_admin();

        if !(is_author || is_community_admin || is_global_admin) {
            return Err(FreePalError::NotAuthorized(
                "not allowed to delete this comment".to_string(),
            ));
        }

        self.store
            .delete(Collection::Comments, &[Filter::eq("id", comment_id)])
            .await?;

        self.invalidate_comment_views(&comment.post_id);
        tracing::info!(
            target: "freepal::comments::delete_comment",
            "Deleted comment {} from post {}",
            comment_id,
            comment.post_id
        );
        Ok(())
    }

    async fn find_comment(&self, comment_id: &str) -> Result<Comment> {
        let row = self
            .store
            .select_single(Collection::Comments, &Query::new().eq("id", comment_id))
            .await
            .map_err(|e| FreePalError::from_lookup(e, format!("comment {}", comment_id)))?;
        Ok(from_row(row)?)
    }

    fn invalidate_comment_views(&self, post_id: &str) {
        self.cache.invalidate(&QueryKey::Comments(post_id.to_string()));
        self.cache.invalidate(&QueryKey::Post(post_id.to_string()));
        self.cache.invalidate_scope(QueryScope::Posts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freepal::remote::RemoteStore;
    use crate::freepal::test_utils::*;

    fn new_comment(post_id: &str, content: &str, parent: Option<&str>) -> NewComment {
        NewComment {
            post_id: post_id.to_string(),
            content: content.to_string(),
            media_urls: vec![],
            parent_comment_id: parent.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_fetch_comments_newest_first_with_authors() {
        let (freepal, store, _identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "c1", POST_PUBLIC, ALICE, None, "2024-02-01T10:00:00Z").await;
        seed_comment(&store, "c2", POST_PUBLIC, BOB, Some("c1"), "2024-02-01T11:00:00Z").await;

        let comments = freepal.fetch_comments(POST_PUBLIC).await.unwrap();

        let ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
        assert_eq!(comments[0].author.username, "bob");
        assert!(comments[0].is_reply());
    }

    #[tokio::test]
    async fn test_comment_tree_nests_replies() {
        let (freepal, store, _identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "a", POST_PUBLIC, ALICE, None, "2024-02-01T10:00:00Z").await;
        seed_comment(&store, "b", POST_PUBLIC, BOB, Some("a"), "2024-02-01T11:00:00Z").await;

        let roots = freepal.comment_tree(POST_PUBLIC).await.unwrap();

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].comment.id, "a");
        assert_eq!(roots[0].children[0].comment.id, "b");
    }

    #[tokio::test]
    async fn test_add_comment_invalidates_thread() {
        let (freepal, _store, _identity, _logs) = create_mock_freepal().await;
        assert!(freepal.fetch_comments(POST_PUBLIC).await.unwrap().is_empty());

        let comment = freepal
            .add_comment(new_comment(POST_PUBLIC, "first!", None))
            .await
            .unwrap();
        assert_eq!(comment.author.username, "alice");
        assert_eq!(
            freepal.cache.is_stale(&QueryKey::Comments(POST_PUBLIC.to_string())),
            Some(true)
        );

        let reply = freepal
            .add_comment(new_comment(POST_PUBLIC, "reply", Some(&comment.id)))
            .await
            .unwrap();
        assert_eq!(reply.parent_comment_id.as_deref(), Some(comment.id.as_str()));
        assert_eq!(freepal.fetch_comments(POST_PUBLIC).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_add_comment_visibility_rules() {
        let (freepal, _store, identity, _logs) = create_mock_freepal().await;

        // Authors may comment on their own private posts
        freepal
            .add_comment(new_comment(POST_PRIVATE, "note to self", None))
            .await
            .unwrap();

        identity.sign_in(BOB);
        let private = freepal
            .add_comment(new_comment(POST_PRIVATE, "hi", None))
            .await;
        assert!(matches!(private, Err(FreePalError::NotAuthorized(_))));

        // Bob is an approved member; Carol is not
        freepal
            .add_comment(new_comment(POST_COMMUNITY, "member comment", None))
            .await
            .unwrap();
        identity.sign_in(CAROL);
        let outsider = freepal
            .add_comment(new_comment(POST_COMMUNITY, "outsider", None))
            .await;
        assert!(matches!(outsider, Err(FreePalError::NotAuthorized(_))));
    }

    #[tokio::test]
    async fn test_add_comment_rejects_bad_input() {
        let (freepal, store, _identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "elsewhere", POST_PRIVATE, ALICE, None, "2024-02-01T10:00:00Z").await;

        let empty = freepal.add_comment(new_comment(POST_PUBLIC, "   ", None)).await;
        assert!(matches!(empty, Err(FreePalError::Validation(_))));

        let missing_post = freepal.add_comment(new_comment("gone", "hello", None)).await;
        assert!(matches!(missing_post, Err(FreePalError::NotFound(_))));

        let missing_parent = freepal
            .add_comment(new_comment(POST_PUBLIC, "hello", Some("nope")))
            .await;
        assert!(matches!(missing_parent, Err(FreePalError::NotFound(_))));

        let cross_post = freepal
            .add_comment(new_comment(POST_PUBLIC, "hello", Some("elsewhere")))
            .await;
        assert!(matches!(cross_post, Err(FreePalError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_comment_author_only_and_merges_media() {
        let (freepal, store, identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "c1", POST_PUBLIC, ALICE, None, "2024-02-01T10:00:00Z").await;

        let edit = CommentEdit {
            post_id: POST_PUBLIC.to_string(),
            comment_id: "c1".to_string(),
            content: "edited".to_string(),
            kept_media_urls: vec!["https://cdn/a.png".to_string()],
            new_media_urls: vec!["https://cdn/b.png".to_string()],
        };

        identity.sign_in(BOB);
        let denied = freepal.update_comment(edit.clone()).await;
        assert!(matches!(denied, Err(FreePalError::NotAuthorized(_))));

        identity.sign_in(ALICE);
        let updated = freepal.update_comment(edit).await.unwrap();
        assert_eq!(updated.content, "edited");
        assert_eq!(
            updated.media_urls,
            vec!["https://cdn/a.png".to_string(), "https://cdn/b.png".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_comment_permissions() {
        let (freepal, store, identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "c1", POST_COMMUNITY, BOB, None, "2024-02-01T10:00:00Z").await;
        seed_comment(&store, "c2", POST_COMMUNITY, BOB, None, "2024-02-01T11:00:00Z").await;
        seed_comment(&store, "c3", POST_COMMUNITY, BOB, None, "2024-02-01T12:00:00Z").await;

        identity.sign_in(CAROL);
        let denied = freepal
            .delete_comment(POST_COMMUNITY, "c1", Some(COMMUNITY_PRIVATE))
            .await;
        assert!(matches!(denied, Err(FreePalError::NotAuthorized(_))));

        // Community admin
        identity.sign_in(ALICE);
        freepal
            .delete_comment(POST_COMMUNITY, "c1", Some(COMMUNITY_PRIVATE))
            .await
            .unwrap();

        // Site admin
        identity.sign_in(ADMIN);
        freepal.delete_comment(POST_COMMUNITY, "c2", None).await.unwrap();

        // Author
        identity.sign_in(BOB);
        freepal.delete_comment(POST_COMMUNITY, "c3", None).await.unwrap();

        assert!(store.is_empty(Collection::Comments));
        let missing = freepal.delete_comment(POST_COMMUNITY, "c3", None).await;
        assert!(matches!(missing, Err(FreePalError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_comment_checks_the_posts_own_community() {
        let (freepal, store, identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "garden", POST_OPEN_COMMUNITY, CAROL, None, "2024-02-01T10:00:00Z").await;
        // Alice administers the book club, not the gardening community
        identity.sign_in(ALICE);

        let claimed = freepal
            .delete_comment(POST_OPEN_COMMUNITY, "garden", Some(COMMUNITY_PRIVATE))
            .await;
        assert!(matches!(claimed, Err(FreePalError::NotAuthorized(_))));

        let wrong_post = freepal
            .delete_comment(POST_COMMUNITY, "garden", Some(COMMUNITY_PRIVATE))
            .await;
        assert!(matches!(wrong_post, Err(FreePalError::NotFound(_))));

        assert_eq!(store.len(Collection::Comments), 1);
    }

    #[tokio::test]
    async fn test_deleted_parent_promotes_replies() {
        let (freepal, store, _identity, _logs) = create_mock_freepal().await;
        seed_comment(&store, "parent", POST_PUBLIC, ALICE, None, "2024-02-01T10:00:00Z").await;
        seed_comment(&store, "reply", POST_PUBLIC, BOB, Some("parent"), "2024-02-01T11:00:00Z").await;

        freepal.delete_comment(POST_PUBLIC, "parent", None).await.unwrap();

        let roots = freepal.comment_tree(POST_PUBLIC).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].comment.id, "reply");
        assert!(
            store
                .select(Collection::Comments, &Query::new())
                .await
                .unwrap()
                .iter()
                .all(|c| c["id"] != json!("parent"))
        );
    }
}
