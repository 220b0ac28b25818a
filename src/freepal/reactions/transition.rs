//! The state change a reaction toggle makes, computed once and applied to
//! every cached view that shows the post.

use chrono::Utc;

use super::types::{PostReactions, Reaction, ReactionType, UserReactionMarker};

/// Temporary ids mark reactions that only exist locally until the next refetch.
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTransition {
    /// No prior reaction: one is added.
    Add(ReactionType),
    /// Same type again: the reaction is toggled off.
    Remove(ReactionType),
    /// Different type: replaced in place.
    Replace { from: ReactionType, to: ReactionType },
}

impl ReactionTransition {
    pub fn resolve(existing: Option<ReactionType>, requested: ReactionType) -> Self {
        match existing {
            None => ReactionTransition::Add(requested),
            Some(current) if current == requested => ReactionTransition::Remove(current),
            Some(current) => ReactionTransition::Replace {
                from: current,
                to: requested,
            },
        }
    }

    pub fn count_delta(&self) -> isize {
        match self {
            ReactionTransition::Add(_) => 1,
            ReactionTransition::Remove(_) => -1,
            ReactionTransition::Replace { .. } => 0,
        }
    }

    /// The user's reaction once the transition is applied.
    pub fn resulting_type(&self) -> Option<ReactionType> {
        match self {
            ReactionTransition::Add(t) => Some(*t),
            ReactionTransition::Remove(_) => None,
            ReactionTransition::Replace { to, .. } => Some(*to),
        }
    }
}

impl PostReactions {
    pub fn apply(&mut self, transition: &ReactionTransition) {
        self.count = self.count.saturating_add_signed(transition.count_delta());
        self.user_reaction = transition
            .resulting_type()
            .map(|reaction_type| UserReactionMarker { reaction_type });
    }
}

/// Applies `transition` to a post's raw reaction list on behalf of `user_id`.
pub fn apply_to_reaction_list(
    reactions: &mut Vec<Reaction>,
    post_id: &str,
    user_id: &str,
    transition: &ReactionTransition,
) {
    let position = reactions.iter().position(|r| r.user_id == user_id);

    match (transition, position) {
        (ReactionTransition::Remove(_), Some(index)) => {
            reactions.remove(index);
        }
        (ReactionTransition::Replace { to, .. }, Some(index)) => {
            reactions[index].reaction_type = *to;
        }
        // The list was cached without this user's reaction; the new state is
        // still a single reaction of the resulting type.
        (ReactionTransition::Replace { to: t, .. }, None) | (ReactionTransition::Add(t), None) => {
            reactions.push(temp_reaction(post_id, user_id, *t));
        }
        (ReactionTransition::Add(t), Some(index)) => {
            reactions[index].reaction_type = *t;
        }
        (ReactionTransition::Remove(_), None) => {}
    }
}

fn temp_reaction(post_id: &str, user_id: &str, reaction_type: ReactionType) -> Reaction {
    Reaction {
        id: format!("{}{}", TEMP_ID_PREFIX, uuid::Uuid::new_v4()),
        post_id: Some(post_id.to_string()),
        comment_id: None,
        user_id: user_id.to_string(),
        reaction_type,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freepal::test_utils::sample_reaction;

    #[test]
    fn test_resolve_covers_three_cases() {
        assert_eq!(
            ReactionTransition::resolve(None, ReactionType::Like),
            ReactionTransition::Add(ReactionType::Like)
        );
        assert_eq!(
            ReactionTransition::resolve(Some(ReactionType::Like), ReactionType::Like),
            ReactionTransition::Remove(ReactionType::Like)
        );
        assert_eq!(
            ReactionTransition::resolve(Some(ReactionType::Like), ReactionType::Sad),
            ReactionTransition::Replace {
                from: ReactionType::Like,
                to: ReactionType::Sad
            }
        );
    }

    #[test]
    fn test_toggle_twice_restores_aggregate() {
        let original = PostReactions {
            count: 0,
            user_reaction: None,
        };
        let mut reactions = original;

        let first = ReactionTransition::resolve(reactions.user_reaction_type(), ReactionType::Love);
        reactions.apply(&first);
        assert_eq!(reactions.count, 1);
        assert_eq!(reactions.user_reaction_type(), Some(ReactionType::Love));

        let second = ReactionTransition::resolve(reactions.user_reaction_type(), ReactionType::Love);
        reactions.apply(&second);
        assert_eq!(reactions, original);
    }

    #[test]
    fn test_replace_keeps_count() {
        let mut reactions = PostReactions {
            count: 4,
            user_reaction: Some(UserReactionMarker {
                reaction_type: ReactionType::Like,
            }),
        };

        let transition = ReactionTransition::resolve(reactions.user_reaction_type(), ReactionType::Wow);
        reactions.apply(&transition);

        assert_eq!(reactions.count, 4);
        assert_eq!(reactions.user_reaction_type(), Some(ReactionType::Wow));
    }

    #[test]
    fn test_remove_never_underflows() {
        let mut reactions = PostReactions {
            count: 0,
            user_reaction: Some(UserReactionMarker {
                reaction_type: ReactionType::Sad,
            }),
        };
        reactions.apply(&ReactionTransition::Remove(ReactionType::Sad));
        assert_eq!(reactions.count, 0);
        assert_eq!(reactions.user_reaction, None);
    }

    #[test]
    fn test_reaction_list_add_uses_temp_id() {
        let mut list = vec![sample_reaction("r1", "p1", "u2")];

        apply_to_reaction_list(&mut list, "p1", "u1", &ReactionTransition::Add(ReactionType::Like));

        assert_eq!(list.len(), 2);
        assert!(list[1].id.starts_with(TEMP_ID_PREFIX));
        assert_eq!(list[1].user_id, "u1");
    }

    #[test]
    fn test_reaction_list_remove_and_replace() {
        let mut list = vec![
            sample_reaction("r1", "p1", "u1"),
            sample_reaction("r2", "p1", "u2"),
        ];

        apply_to_reaction_list(
            &mut list,
            "p1",
            "u2",
            &ReactionTransition::Replace {
                from: ReactionType::Like,
                to: ReactionType::Angry,
            },
        );
        assert_eq!(list[1].reaction_type, ReactionType::Angry);

        apply_to_reaction_list(&mut list, "p1", "u1", &ReactionTransition::Remove(ReactionType::Like));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "r2");
    }
}
