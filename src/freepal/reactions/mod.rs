//! Post reactions: types, the optimistic toggle, per-type counts and picker state.

mod coordinator;
mod picker;
mod summary;
mod transition;
mod types;

pub use picker::ReactionPicker;
pub use summary::{ReactionCounts, display_reaction};
pub use transition::{ReactionTransition, TEMP_ID_PREFIX, apply_to_reaction_list};
pub use types::{PostReactions, Reaction, ReactionCommit, ReactionType, UserReactionMarker};
