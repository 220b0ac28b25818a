use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{Reaction, ReactionType};
use crate::freepal::FreePal;
use crate::freepal::error::Result;

/// Per-type reaction counts for one post. Every type is present, at zero by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionCounts {
    counts: BTreeMap<ReactionType, usize>,
}

impl Default for ReactionCounts {
    fn default() -> Self {
        Self {
            counts: ReactionType::ALL.into_iter().map(|t| (t, 0)).collect(),
        }
    }
}

impl ReactionCounts {
    pub fn from_reactions(reactions: &[Reaction]) -> Self {
        let mut summary = Self::default();
        for reaction in reactions {
            *summary.counts.entry(reaction.reaction_type).or_default() += 1;
        }
        summary
    }

    pub fn get(&self, reaction_type: ReactionType) -> usize {
        self.counts.get(&reaction_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Counts in picker order.
    pub fn iter(&self) -> impl Iterator<Item = (ReactionType, usize)> + '_ {
        ReactionType::ALL.into_iter().map(|t| (t, self.get(t)))
    }
}

/// The reaction a post's reaction button shows: the user's own, or the first picker entry.
pub fn display_reaction(user_reaction: Option<ReactionType>) -> ReactionType {
    user_reaction.unwrap_or(ReactionType::ALL[0])
}

impl FreePal {
    /// Per-type counts over the post's reaction list.
    pub async fn reaction_counts(&self, post_id: &str) -> Result<ReactionCounts> {
        let reactions = self.fetch_post_reactions(post_id).await?;
        Ok(ReactionCounts::from_reactions(&reactions))
    }
}
