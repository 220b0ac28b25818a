//! Threaded comments.
//!
//! [`build_comment_tree`] turns the flat list the backend returns into a reply
//! forest. [`ThreadView`] decides which part of that forest is rendered, from
//! the forest and an [`ExpansionState`] alone. Both are pure; the forest is
//! rebuilt from a fresh fetch whenever the comments change.

mod builder;
mod view;

pub use builder::{CommentNode, build_comment_tree, count_comments, find_comment};
pub use view::{CommentView, ExpansionState, ThreadControl, ThreadView, ThreadViewConfig};

#[cfg(test)]
mod tests;
