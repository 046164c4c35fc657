//! Mock identity resolver and library inventory.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::identity::{LibraryInventory, MediaResolver, ResolveError, ResolveQuery};
use crate::media::{EpisodeSet, MediaIdentity, MediaType};

/// Resolver answering from a fixed set of identities.
///
/// Titles match case-insensitively against the title or original title; the
/// year only has to match for strict queries.
#[derive(Debug, Default)]
pub struct MockResolver {
    identities: Arc<RwLock<Vec<MediaIdentity>>>,
    fail: Arc<RwLock<bool>>,
    resolve_calls: Arc<RwLock<usize>>,
    lookup_calls: Arc<RwLock<usize>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, identity: MediaIdentity) {
        self.identities.write().await.push(identity);
    }

    /// Make every call fail with an API error.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn resolve_calls(&self) -> usize {
        *self.resolve_calls.read().await
    }

    pub async fn lookup_calls(&self) -> usize {
        *self.lookup_calls.read().await
    }

    async fn check_fail(&self) -> Result<(), ResolveError> {
        if *self.fail.read().await {
            return Err(ResolveError::ApiError {
                status: 503,
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaResolver for MockResolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, query: &ResolveQuery) -> Result<Option<MediaIdentity>, ResolveError> {
        *self.resolve_calls.write().await += 1;
        self.check_fail().await?;

        let title = query.title.trim();
        Ok(self
            .identities
            .read()
            .await
            .iter()
            .find(|identity| {
                let title_matches = identity.title.eq_ignore_ascii_case(title)
                    || identity
                        .original_title
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case(title));
                let type_matches = query.media_type.map_or(true, |t| t == identity.media_type);
                let year_matches = !query.strict
                    || match (query.year, identity.year) {
                        (Some(want), Some(got)) => want == got,
                        _ => true,
                    };
                title_matches && type_matches && year_matches
            })
            .cloned())
    }

    async fn lookup(
        &self,
        external_id: &str,
        media_type: MediaType,
    ) -> Result<Option<MediaIdentity>, ResolveError> {
        *self.lookup_calls.write().await += 1;
        self.check_fail().await?;

        Ok(self
            .identities
            .read()
            .await
            .iter()
            .find(|identity| {
                identity.media_type == media_type
                    && (identity.id == external_id
                        || identity.imdb_id.as_deref() == Some(external_id))
            })
            .cloned())
    }
}

/// Library inventory with configurable answers.
///
/// Unconfigured media answer `None` ("cannot tell").
#[derive(Debug, Default)]
pub struct MockLibrary {
    missing: Arc<RwLock<HashMap<(String, u32), EpisodeSet>>>,
    movies: Arc<RwLock<HashSet<String>>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Episodes of `season` the library lacks; an empty slice means complete.
    pub async fn set_missing(&self, identity: &MediaIdentity, season: u32, episodes: &[u32]) {
        self.missing.write().await.insert(
            (identity.key(), season),
            episodes.iter().copied().collect(),
        );
    }

    pub async fn add_movie(&self, identity: &MediaIdentity) {
        self.movies.write().await.insert(identity.key());
    }
}

#[async_trait]
impl LibraryInventory for MockLibrary {
    async fn missing_episodes(
        &self,
        identity: &MediaIdentity,
        season: u32,
        _total_episodes: u32,
    ) -> Option<EpisodeSet> {
        self.missing
            .read()
            .await
            .get(&(identity.key(), season))
            .cloned()
    }

    async fn movie_exists(&self, identity: &MediaIdentity) -> Option<bool> {
        Some(self.movies.read().await.contains(&identity.key()))
    }
}
