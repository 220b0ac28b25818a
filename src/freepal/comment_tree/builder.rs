use serde::Serialize;
use std::collections::HashMap;

use crate::freepal::comments::Comment;

/// A comment and its direct replies, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    pub fn id(&self) -> &str {
        &self.comment.id
    }

    /// Every node below this one.
    pub fn descendant_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&CommentNode> = self.children.iter().collect();
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// The node for `id` in this subtree.
    pub fn find(&self, id: &str) -> Option<&CommentNode> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.id() == id {
                return Some(node);
            }
            stack.extend(node.children.iter());
        }
        None
    }
}

/// Total number of comments in a forest.
pub fn count_comments(roots: &[CommentNode]) -> usize {
    roots.iter().map(|root| 1 + root.descendant_count()).sum()
}

/// Finds a comment anywhere in a forest; the root of a "full conversation" view.
pub fn find_comment<'a>(roots: &'a [CommentNode], id: &str) -> Option<&'a CommentNode> {
    roots.iter().find_map(|root| root.find(id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    OnPath,
    Done,
}

/// Cuts the parent link of the earliest comment (in input order) on each cycle.
fn break_cycles(parents: &mut [Option<usize>]) {
    let mut state = vec![Visit::New; parents.len()];

    for start in 0..parents.len() {
        if state[start] != Visit::New {
            continue;
        }

        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(node) = current {
            match state[node] {
                Visit::Done => break,
                Visit::OnPath => {
                    if let Some(position) = path.iter().position(|&n| n == node) {
                        if let Some(&first) = path[position..].iter().min() {
                            parents[first] = None;
                        }
                    }
                    break;
                }
                Visit::New => {
                    state[node] = Visit::OnPath;
                    path.push(node);
                    current = parents[node];
                }
            }
        }

        for node in path {
            state[node] = Visit::Done;
        }
    }
}

/// Builds the reply forest for one post's flat comment list.
///
/// Replies attach to their parent in input order. A comment whose parent is
/// not in `comments` becomes a root. The result holds every input comment
/// exactly once, for any input.
pub fn build_comment_tree(comments: &[Comment]) -> Vec<CommentNode> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(comments.len());
    for (i, comment) in comments.iter().enumerate() {
        index.entry(comment.id.as_str()).or_insert(i);
    }

    let mut parents: Vec<Option<usize>> = comments
        .iter()
        .enumerate()
        .map(|(i, comment)| {
            comment
                .parent_comment_id
                .as_deref()
                .and_then(|parent_id| index.get(parent_id).copied())
                .filter(|&parent| parent != i)
        })
        .collect();
    break_cycles(&mut parents);

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();
    for (i, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children[*parent].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order walk, then assemble bottom-up so deep chains never recurse
    let mut order = Vec::with_capacity(comments.len());
    let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(children[i].iter().rev());
    }

    let mut built: Vec<Option<CommentNode>> = vec![None; comments.len()];
    for &i in order.iter().rev() {
        let node_children = children[i]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[i] = Some(CommentNode {
            comment: comments[i].clone(),
            children: node_children,
        });
    }

    roots
        .iter()
        .filter_map(|&root| built[root].take())
        .collect()
}
