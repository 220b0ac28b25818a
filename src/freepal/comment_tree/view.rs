//! What of a comment forest is on screen, given the user's expansion choices.
//!
//! Nothing is dropped: hidden comments are only deferred behind a control.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::builder::{CommentNode, count_comments};
use crate::freepal::comments::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadViewConfig {
    /// Root comments shown before "View N more comments"
    pub root_page_size: usize,
    /// Deepest level rendered inline; replies below it sit behind "View full conversation"
    pub max_visual_level: usize,
    /// Replies shown at the last inline level before "Show N more replies"
    pub inline_reply_limit: usize,
}

impl Default for ThreadViewConfig {
    fn default() -> Self {
        Self {
            root_page_size: 3,
            max_visual_level: 1,
            inline_reply_limit: 2,
        }
    }
}

/// The user's expand/collapse choices for one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionState {
    show_all_roots: bool,
    expanded: HashSet<String>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shows_all_roots(&self) -> bool {
        self.show_all_roots
    }

    pub fn toggle_roots(&mut self) {
        self.show_all_roots = !self.show_all_roots;
    }

    pub fn is_expanded(&self, comment_id: &str) -> bool {
        self.expanded.contains(comment_id)
    }

    pub fn expand(&mut self, comment_id: impl Into<String>) {
        self.expanded.insert(comment_id.into());
    }

    pub fn collapse(&mut self, comment_id: &str) {
        self.expanded.remove(comment_id);
    }

    pub fn toggle_replies(&mut self, comment_id: &str) {
        if !self.expanded.remove(comment_id) {
            self.expanded.insert(comment_id.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadControl {
    ViewMoreComments { hidden: usize },
    ShowLessComments,
    ShowMoreReplies { comment_id: String, hidden: usize },
    ShowLessReplies { comment_id: String },
    ViewFullConversation { comment_id: String, hidden: usize },
}

fn replies_word(count: usize) -> &'static str {
    if count == 1 { "reply" } else { "replies" }
}

impl ThreadControl {
    pub fn label(&self) -> String {
        match self {
            ThreadControl::ViewMoreComments { hidden } => {
                format!("View {} more comments", hidden)
            }
            ThreadControl::ShowLessComments | ThreadControl::ShowLessReplies { .. } => {
                "Show less".to_string()
            }
            ThreadControl::ShowMoreReplies { hidden, .. } => {
                format!("Show {} more {}", hidden, replies_word(*hidden))
            }
            ThreadControl::ViewFullConversation { hidden, .. } => {
                format!(
                    "View full conversation ({} more {})",
                    hidden,
                    replies_word(*hidden)
                )
            }
        }
    }

    /// Applies a click on this control to `state`.
    pub fn activate(&self, state: &mut ExpansionState) {
        match self {
            ThreadControl::ViewMoreComments { .. } | ThreadControl::ShowLessComments => {
                state.toggle_roots()
            }
            ThreadControl::ShowMoreReplies { comment_id, .. }
            | ThreadControl::ViewFullConversation { comment_id, .. } => state.expand(comment_id.clone()),
            ThreadControl::ShowLessReplies { comment_id } => state.collapse(comment_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub comment: Comment,
    /// Depth below the root; roots are level 0
    pub level: usize,
    /// Username of the parent comment's author
    pub reply_to: Option<String>,
    pub replies: Vec<CommentView>,
    pub control: Option<ThreadControl>,
}

impl CommentView {
    pub fn reply_prefix(&self) -> Option<String> {
        self.reply_to
            .as_ref()
            .map(|username| format!("Reply to @{}", username))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadView {
    pub total_comments: usize,
    pub comments: Vec<CommentView>,
    pub control: Option<ThreadControl>,
}

impl ThreadView {
    pub fn new(roots: &[CommentNode], state: &ExpansionState, config: &ThreadViewConfig) -> Self {
        let total_roots = roots.len();
        let page = config.root_page_size;

        let (visible, control) = if total_roots <= page {
            (total_roots, None)
        } else if state.shows_all_roots() {
            (total_roots, Some(ThreadControl::ShowLessComments))
        } else {
            (
                page,
                Some(ThreadControl::ViewMoreComments {
                    hidden: total_roots - page,
                }),
            )
        };

        Self {
            total_comments: count_comments(roots),
            comments: roots[..visible]
                .iter()
                .map(|root| render_node(root, 0, None, state, config))
                .collect(),
            control,
        }
    }

    /// "1 Comment" / "N Comments"
    pub fn heading(&self) -> String {
        let noun = if self.total_comments == 1 { "Comment" } else { "Comments" };
        format!("{} {}", self.total_comments, noun)
    }

    /// Ids of every rendered comment, in display order.
    pub fn visible_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        let mut stack: Vec<&CommentView> = self.comments.iter().rev().collect();
        while let Some(view) = stack.pop() {
            ids.push(view.comment.id.as_str());
            stack.extend(view.replies.iter().rev());
        }
        ids
    }

    pub fn find(&self, comment_id: &str) -> Option<&CommentView> {
        let mut stack: Vec<&CommentView> = self.comments.iter().collect();
        while let Some(view) = stack.pop() {
            if view.comment.id == comment_id {
                return Some(view);
            }
            stack.extend(view.replies.iter());
        }
        None
    }
}

/// How many replies a collapsed node at `level` shows, and the control that reveals the rest.
fn collapsed_replies(
    node: &CommentNode,
    level: usize,
    config: &ThreadViewConfig,
) -> (usize, Option<ThreadControl>) {
    let total = node.children.len();
    let comment_id = node.id().to_string();

    if level >= config.max_visual_level {
        (
            0,
            Some(ThreadControl::ViewFullConversation {
                comment_id,
                hidden: total,
            }),
        )
    } else if level + 1 == config.max_visual_level && total > config.inline_reply_limit {
        (
            config.inline_reply_limit,
            Some(ThreadControl::ShowMoreReplies {
                comment_id,
                hidden: total - config.inline_reply_limit,
            }),
        )
    } else {
        (total, None)
    }
}

fn render_node(
    node: &CommentNode,
    level: usize,
    reply_to: Option<&str>,
    state: &ExpansionState,
    config: &ThreadViewConfig,
) -> CommentView {
    let total = node.children.len();

    let (visible, control) = if total == 0 {
        (0, None)
    } else {
        let (collapsed_visible, collapsed_control) = collapsed_replies(node, level, config);
        if collapsed_control.is_some() && state.is_expanded(node.id()) {
            (
                total,
                Some(ThreadControl::ShowLessReplies {
                    comment_id: node.id().to_string(),
                }),
            )
        } else {
            (collapsed_visible, collapsed_control)
        }
    };

    let author = node.comment.author.username.as_str();
    CommentView {
        comment: node.comment.clone(),
        level,
        reply_to: reply_to.map(str::to_string),
        replies: node.children[..visible]
            .iter()
            .map(|child| render_node(child, level + 1, Some(author), state, config))
            .collect(),
        control,
    }
}
