//! Identity resolution and library inventory.
//!
//! The resolver maps a free-text title to a canonical `MediaIdentity`; the
//! library inventory answers "what do we already have" questions. Both are
//! external collaborators behind traits.

mod tmdb;

pub use tmdb::TmdbResolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::media::{EpisodeSet, MediaIdentity, MediaType};

/// Errors that can occur while resolving identities.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limit exceeded, please wait before retrying")]
    RateLimitExceeded,

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Resolver not configured: {0}")]
    NotConfigured(String),
}

/// Free-text lookup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    pub title: String,
    pub year: Option<u32>,
    pub media_type: Option<MediaType>,
    /// Require an exact title (and year, when given) match.
    pub strict: bool,
}

impl ResolveQuery {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            year: None,
            media_type: None,
            strict: false,
        }
    }

    pub fn with_year(mut self, year: Option<u32>) -> Self {
        self.year = year;
        self
    }

    pub fn with_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Resolves names and external ids to canonical identities.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means nothing matched; errors are transport or API failures.
    async fn resolve(&self, query: &ResolveQuery) -> Result<Option<MediaIdentity>, ResolveError>;

    /// Look up by catalog id or IMDb id (`tt...`).
    async fn lookup(
        &self,
        external_id: &str,
        media_type: MediaType,
    ) -> Result<Option<MediaIdentity>, ResolveError>;
}

/// Media-server view of what already exists on disk.
#[async_trait]
pub trait LibraryInventory: Send + Sync {
    /// Episodes of `season` not present in the library.
    ///
    /// `None` when the library is not configured or cannot tell; an empty set
    /// means the season is complete.
    async fn missing_episodes(
        &self,
        identity: &MediaIdentity,
        season: u32,
        total_episodes: u32,
    ) -> Option<EpisodeSet>;

    /// `None` when the library is not configured or cannot tell.
    async fn movie_exists(&self, identity: &MediaIdentity) -> Option<bool>;
}

/// Inventory used when no media server is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLibrary;

#[async_trait]
impl LibraryInventory for NoLibrary {
    async fn missing_episodes(
        &self,
        _identity: &MediaIdentity,
        _season: u32,
        _total_episodes: u32,
    ) -> Option<EpisodeSet> {
        None
    }

    async fn movie_exists(&self, _identity: &MediaIdentity) -> Option<bool> {
        None
    }
}
