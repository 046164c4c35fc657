//! Types for the indexer search system.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::FilterArgs;

/// A site reachable through an indexer backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerSite {
    /// Indexer/site id.
    pub name: String,
    /// Public trackers skip the zero-seeder check.
    pub public: bool,
    /// Site preference, lower is better.
    pub rank: u32,
}

/// Raw hit from a single site (before classification).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    /// Subtitle / description as reported by the site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub site: String,
    pub size_bytes: u64,
    /// `None` when the site did not report seeders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    pub peers: u32,
    /// `.torrent` enclosure URL or magnet URI.
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    /// Upload volume factor (1.0 = normal, 2.0 = double upload credit).
    pub upload_factor: f64,
    /// Download volume factor (1.0 = normal, 0.0 = freeleech).
    pub download_factor: f64,
}

/// Errors that can occur while querying an indexer.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Site not found: {0}")]
    SiteNotFound(String),

    #[error("Request timeout")]
    Timeout,
}

/// Trait for indexer backends.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Sites this backend can query.
    fn sites(&self) -> Vec<IndexerSite>;

    /// Search one site for a keyword.
    async fn search(
        &self,
        site: &IndexerSite,
        keyword: &str,
        args: &FilterArgs,
    ) -> Result<Vec<RawCandidate>, IndexerError>;
}
