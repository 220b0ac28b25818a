use std::fmt;

use crate::freepal::comments::Comment;
use crate::freepal::posts::{PostFeed, PostWithRelations};
use crate::freepal::reactions::Reaction;

/// Structured cache key: the entity kind plus whatever identifies the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Post(String),
    Posts(PostFeed),
    Reactions(String),
    Comments(String),
    Users,
    User(String),
    Communities,
    Community(String),
}

/// The root of a [`QueryKey`]; used to act on every key under it at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryScope {
    Post,
    Posts,
    Reactions,
    Comments,
    Users,
    User,
    Communities,
    Community,
}

impl QueryScope {
    pub const ALL: [QueryScope; 8] = [
        QueryScope::Post,
        QueryScope::Posts,
        QueryScope::Reactions,
        QueryScope::Comments,
        QueryScope::Users,
        QueryScope::User,
        QueryScope::Communities,
        QueryScope::Community,
    ];
}

impl QueryKey {
    pub fn scope(&self) -> QueryScope {
        match self {
            QueryKey::Post(_) => QueryScope::Post,
            QueryKey::Posts(_) => QueryScope::Posts,
            QueryKey::Reactions(_) => QueryScope::Reactions,
            QueryKey::Comments(_) => QueryScope::Comments,
            QueryKey::Users => QueryScope::Users,
            QueryKey::User(_) => QueryScope::User,
            QueryKey::Communities => QueryScope::Communities,
            QueryKey::Community(_) => QueryScope::Community,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Post(id) => write!(f, "[post, {}]", id),
            QueryKey::Posts(feed) => write!(f, "[posts, {}]", feed),
            QueryKey::Reactions(id) => write!(f, "[reactions, {}]", id),
            QueryKey::Comments(id) => write!(f, "[comments, {}]", id),
            QueryKey::Users => f.write_str("[users]"),
            QueryKey::User(username) => write!(f, "[user, {}]", username),
            QueryKey::Communities => f.write_str("[communities]"),
            QueryKey::Community(id) => write!(f, "[community, {}]", id),
        }
    }
}

/// Values the client keeps per key.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Post(PostWithRelations),
    Posts(Vec<PostWithRelations>),
    Reactions(Vec<Reaction>),
    Comments(Vec<Comment>),
}

impl CachedValue {
    pub fn as_post(&self) -> Option<&PostWithRelations> {
        match self {
            CachedValue::Post(post) => Some(post),
            _ => None,
        }
    }

    pub fn as_posts(&self) -> Option<&[PostWithRelations]> {
        match self {
            CachedValue::Posts(posts) => Some(posts),
            _ => None,
        }
    }

    pub fn as_reactions(&self) -> Option<&[Reaction]> {
        match self {
            CachedValue::Reactions(reactions) => Some(reactions),
            _ => None,
        }
    }

    pub fn as_comments(&self) -> Option<&[Comment]> {
        match self {
            CachedValue::Comments(comments) => Some(comments),
            _ => None,
        }
    }

    /// Whether this value shows `post_id` (as the post itself or as a feed entry).
    pub fn contains_post(&self, post_id: &str) -> bool {
        match self {
            CachedValue::Post(post) => post.post.id == post_id,
            CachedValue::Posts(posts) => posts.iter().any(|p| p.post.id == post_id),
            _ => false,
        }
    }
}
