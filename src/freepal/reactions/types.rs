use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::freepal::error::FreePalError;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Love,
    Wow,
    Funny,
    Sad,
    Angry,
}

impl ReactionType {
    /// Picker order.
    pub const ALL: [ReactionType; 6] = [
        ReactionType::Love,
        ReactionType::Like,
        ReactionType::Funny,
        ReactionType::Wow,
        ReactionType::Sad,
        ReactionType::Angry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionType::Like => "like",
            ReactionType::Love => "love",
            ReactionType::Wow => "wow",
            ReactionType::Funny => "funny",
            ReactionType::Sad => "sad",
            ReactionType::Angry => "angry",
        }
    }

    /// Hex colour used for the reaction's label and icon.
    pub fn color(&self) -> &'static str {
        match self {
            ReactionType::Love => "#F43F5E",
            ReactionType::Like => "#3B82F6",
            ReactionType::Funny => "#F59E0B",
            ReactionType::Wow => "#8B5CF6",
            ReactionType::Sad => "#6B7280",
            ReactionType::Angry => "#EF4444",
        }
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionType {
    type Err = FreePalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FreePalError::Validation(format!("unknown reaction type: {}", s)))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reaction {
    pub id: String,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub user_id: String,
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
    pub created_at: DateTime<Utc>,
}

/// The current user's reaction, as carried on a post.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserReactionMarker {
    #[serde(rename = "type")]
    pub reaction_type: ReactionType,
}

/// Reaction aggregate shown on post cards.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostReactions {
    pub count: usize,
    pub user_reaction: Option<UserReactionMarker>,
}

impl PostReactions {
    pub fn user_reaction_type(&self) -> Option<ReactionType> {
        self.user_reaction.map(|marker| marker.reaction_type)
    }
}

/// What the backend ended up storing for a toggle.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionCommit {
    Inserted(Reaction),
    Updated(Reaction),
    Deleted(Reaction),
}

impl ReactionCommit {
    pub fn reaction(&self) -> &Reaction {
        match self {
            ReactionCommit::Inserted(r) | ReactionCommit::Updated(r) | ReactionCommit::Deleted(r) => r,
        }
    }
}
