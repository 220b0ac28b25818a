use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod freepal;

pub use crate::freepal::comment_tree::{
    CommentNode, CommentView, ExpansionState, ThreadControl, ThreadView, ThreadViewConfig,
    build_comment_tree, count_comments, find_comment,
};
pub use crate::freepal::comments::{Comment, CommentEdit, CommentStatus, NewComment};
pub use crate::freepal::communities::{
    Community, CommunityMember, CommunityRole, CommunitySummary, MemberStatus,
};
pub use crate::freepal::error::{FreePalError, Result};
pub use crate::freepal::moderation::{ModeratorAction, ModeratorActionKind, ModeratorActionRequest};
pub use crate::freepal::notices::{Notice, NoticeCenter, NoticeKind, NoticeSeverity};
pub use crate::freepal::posts::{
    CreatePostInput, Post, PostFeed, PostStatus, PostVisibility, PostWithRelations,
};
pub use crate::freepal::query_cache::{
    CacheEntry, CacheSnapshot, CachedValue, QueryCache, QueryKey, QueryScope,
};
pub use crate::freepal::reactions::{
    PostReactions, Reaction, ReactionCommit, ReactionCounts, ReactionPicker, ReactionTransition,
    ReactionType, UserReactionMarker, display_reaction,
};
pub use crate::freepal::realtime::{
    ChangeEvent, ChangeFeed, ChangeKind, Invalidation, invalidations_for,
};
pub use crate::freepal::remote::{
    Collection, Filter, IdentityProvider, InMemoryStore, PostgrestStore, Query, RemoteConfig,
    RemoteError, RemoteStore, RestIdentity, Row, StaticIdentity, StoreOperation,
};
pub use crate::freepal::users::{AuthorSummary, User, UserRole};
pub use crate::freepal::{FreePal, FreePalConfig};

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("freepal")
            .filename_suffix("log")
            .build(logs_dir);

        let file_appender = match file_appender {
            Ok(appender) => appender,
            Err(e) => {
                eprintln!("Failed to create log file appender in {:?}: {}", logs_dir, e);
                return;
            }
        };

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        // Another subscriber may already be installed by the embedding app
        let _ = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init();
    });
}
