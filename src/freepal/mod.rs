use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashMap;
use tokio::sync::{Semaphore, broadcast};

pub mod comment_tree;
pub mod comments;
pub mod communities;
pub mod error;
pub mod moderation;
pub mod notices;
pub mod posts;
pub mod query_cache;
pub mod reactions;
pub mod realtime;
pub mod remote;
pub mod users;

use crate::init_tracing;

use comment_tree::ThreadViewConfig;
use error::{FreePalError, Result};
use notices::{Notice, NoticeCenter};
use query_cache::QueryCache;
use remote::{IdentityProvider, PostgrestStore, RemoteConfig, RemoteStore, RestIdentity};

#[derive(Clone, Debug)]
pub struct FreePalConfig {
    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Posts loaded per feed request
    pub feed_page_size: usize,

    /// Pagination and collapse rules for comment threads
    pub thread_view: ThreadViewConfig,

    /// Run reaction toggles on the same post one after another
    pub serialize_reaction_toggles: bool,
}

impl FreePalConfig {
    pub fn new(logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };

        Self {
            logs_dir: logs_dir.join(env_suffix),
            feed_page_size: 10,
            thread_view: ThreadViewConfig::default(),
            serialize_reaction_toggles: true,
        }
    }
}

pub struct FreePal {
    pub config: FreePalConfig,
    pub(crate) store: Arc<dyn RemoteStore>,
    pub(crate) identity: Arc<dyn IdentityProvider>,
    pub(crate) cache: Arc<QueryCache>,
    pub(crate) notices: NoticeCenter,
    /// Per-post guards so overlapping reaction toggles on one post run in order
    pub(crate) reaction_guards: DashMap<String, Arc<Semaphore>>,
}

impl std::fmt::Debug for FreePal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreePal")
            .field("config", &self.config)
            .field("store", &"<REDACTED>")
            .field("identity", &"<REDACTED>")
            .field("cached_queries", &self.cache.len())
            .finish()
    }
}

impl FreePal {
    /// Builds a client over the given store and identity, without touching the filesystem.
    pub fn new(
        config: FreePalConfig,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            store,
            identity,
            cache: Arc::new(QueryCache::new()),
            notices: NoticeCenter::new(),
            reaction_guards: DashMap::new(),
        }
    }

    /// Initializes the client: creates the logs directory, sets up logging
    /// and wires the store and identity provider.
    ///
    /// # Arguments
    ///
    /// * `config` - A [`FreePalConfig`] with the logs directory and view settings.
    /// * `store` - Where posts, comments and reactions live.
    /// * `identity` - Resolves the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs directory cannot be created.
    pub fn initialize(
        config: FreePalConfig,
        store: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let logs_dir = &config.logs_dir;

        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(FreePalError::from)?;

        // Only initialize tracing once
        init_tracing(logs_dir);

        tracing::debug!(
            target: "freepal::initialize",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        Ok(Self::new(config, store, identity))
    }

    /// Initializes a client against the hosted backend named in the environment.
    ///
    /// See [`RemoteConfig::from_env`] for the variables read. The returned store
    /// and identity handles are where the session's access token is set.
    pub fn initialize_from_env(
        config: FreePalConfig,
    ) -> Result<(Self, Arc<PostgrestStore>, Arc<RestIdentity>)> {
        let remote = RemoteConfig::from_env()?;
        let store = Arc::new(PostgrestStore::new(remote.clone()));
        let identity = Arc::new(RestIdentity::new(remote));

        let freepal = Self::initialize(config, store.clone(), identity.clone())?;
        Ok((freepal, store, identity))
    }

    /// The query cache shared by every view of this client.
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// User-facing notices (errors and confirmations) as they are raised.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;

    mod config_tests {
        use super::*;

        #[test]
        fn test_freepal_config_new() {
            let logs_dir = std::path::Path::new("/test/logs");
            let config = FreePalConfig::new(logs_dir);

            if cfg!(debug_assertions) {
                assert_eq!(config.logs_dir, logs_dir.join("dev"));
            } else {
                assert_eq!(config.logs_dir, logs_dir.join("release"));
            }
            assert_eq!(config.feed_page_size, 10);
            assert_eq!(config.thread_view, ThreadViewConfig::default());
            assert!(config.serialize_reaction_toggles);
        }
    }

    mod initialization_tests {
        use super::*;
        use crate::freepal::remote::{InMemoryStore, StaticIdentity};

        #[tokio::test]
        async fn test_initialize_creates_logs_dir() {
            let (config, _logs_temp) = create_test_config();
            let logs_dir = config.logs_dir.clone();

            let freepal = FreePal::initialize(
                config,
                Arc::new(InMemoryStore::new()),
                Arc::new(StaticIdentity::signed_out()),
            )
            .unwrap();

            assert!(logs_dir.exists());
            assert!(freepal.cache().is_empty());
        }

        #[tokio::test]
        async fn test_freepal_debug_format() {
            let (freepal, _store, _identity, _logs) = create_mock_freepal().await;

            let debug_str = format!("{:?}", freepal);
            assert!(debug_str.contains("FreePal"));
            assert!(debug_str.contains("config"));
            assert!(debug_str.contains("<REDACTED>"));
        }

        #[tokio::test]
        async fn test_mock_fixtures_are_seeded() {
            let (freepal, store, _identity, _logs) = create_mock_freepal().await;

            assert_eq!(store.len(remote::Collection::Users), 4);
            assert_eq!(store.len(remote::Collection::Posts), 4);
            assert_eq!(freepal.fetch_user(BOB).await.unwrap().username, "bob");
        }
    }
}
