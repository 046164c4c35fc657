//! Mock torrent introspector for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download::{IntrospectError, TorrentIntrospector};
use crate::media::EpisodeSet;

/// Introspector with per-locator answers.
///
/// Unknown locators fail with `Unsupported`, as magnets do in production.
#[derive(Debug, Default)]
pub struct MockIntrospector {
    episodes: Arc<RwLock<HashMap<String, EpisodeSet>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MockIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_episodes(&self, locator: &str, episodes: &[u32]) {
        self.episodes
            .write()
            .await
            .insert(locator.to_string(), episodes.iter().copied().collect());
    }

    /// Fetching `locator` fails with an HTTP error.
    pub async fn fail_for(&self, locator: &str) {
        self.failing.write().await.insert(locator.to_string());
    }
}

#[async_trait]
impl TorrentIntrospector for MockIntrospector {
    async fn episodes(&self, locator: &str) -> Result<EpisodeSet, IntrospectError> {
        if self.failing.read().await.contains(locator) {
            return Err(IntrospectError::Http(format!("{} unreachable", locator)));
        }
        self.episodes
            .read()
            .await
            .get(locator)
            .cloned()
            .ok_or_else(|| IntrospectError::Unsupported(locator.to_string()))
    }
}
