use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use freepal::{
    Comment, CommentView, ExpansionState, ThreadControl, ThreadView, ThreadViewConfig,
    build_comment_tree,
};

/// Renders a comment thread the way the post page shows it
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// JSON array of comments, as returned by the comments endpoint
    #[clap(long, value_name = "PATH", required = true)]
    comments: PathBuf,

    /// Comment whose replies are expanded; may be repeated
    #[clap(long, value_name = "ID")]
    expand: Vec<String>,

    /// Show every top-level comment instead of the first page
    #[clap(long)]
    all_roots: bool,

    /// Top-level comments shown before "View N more comments"
    #[clap(long, default_value_t = 3)]
    root_page_size: usize,

    /// Deepest nesting level rendered inline
    #[clap(long, default_value_t = 1)]
    max_visual_level: usize,
}

fn control_line(control: &ThreadControl, indent: usize) -> String {
    format!("{}[{}]", "    ".repeat(indent), control.label())
}

fn render_comment(view: &CommentView, lines: &mut Vec<String>) {
    let indent = "    ".repeat(view.level);
    if let Some(prefix) = view.reply_prefix() {
        lines.push(format!("{}{}", indent, prefix));
    }
    lines.push(format!(
        "{}- @{} ({}): {}",
        indent,
        view.comment.author.username,
        view.comment.id,
        view.comment.content
    ));
    for reply in &view.replies {
        render_comment(reply, lines);
    }
    if let Some(control) = &view.control {
        lines.push(control_line(control, view.level + 1));
    }
}

fn render(thread: &ThreadView) -> Vec<String> {
    let mut lines = vec![thread.heading()];
    for comment in &thread.comments {
        render_comment(comment, &mut lines);
    }
    if let Some(control) = &thread.control {
        lines.push(control_line(control, 0));
    }
    lines
}

fn main() -> Result<()> {
    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.comments)
        .with_context(|| format!("Failed to read comments file: {:?}", args.comments))?;
    let comments: Vec<Comment> =
        serde_json::from_str(&raw).context("Comments file is not a JSON array of comments")?;

    let mut state = ExpansionState::new();
    if args.all_roots {
        state.toggle_roots();
    }
    for id in args.expand {
        state.expand(id);
    }

    let config = ThreadViewConfig {
        root_page_size: args.root_page_size,
        max_visual_level: args.max_visual_level,
        ..ThreadViewConfig::default()
    };

    let roots = build_comment_tree(&comments);
    for line in render(&ThreadView::new(&roots, &state, &config)) {
        println!("{}", line);
    }

    Ok(())
}
