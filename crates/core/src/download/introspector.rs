//! Payload introspection: which episodes does a `.torrent` carry?
//!
//! Uses librqbit-core to parse the bencoded metainfo and lists file paths
//! without downloading any payload data.

use std::time::Duration;

use async_trait::async_trait;
use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::media::{is_video_file, parse_release, EpisodeSet};

#[derive(Debug, Error)]
pub enum IntrospectError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to parse torrent: {0}")]
    Parse(String),

    #[error("Payload not introspectable: {0}")]
    Unsupported(String),
}

/// Lists the episode numbers a payload carries.
#[async_trait]
pub trait TorrentIntrospector: Send + Sync {
    async fn episodes(&self, locator: &str) -> Result<EpisodeSet, IntrospectError>;
}

/// Fetches `.torrent` files over HTTP.
pub struct HttpTorrentIntrospector {
    client: Client,
}

impl HttpTorrentIntrospector {
    pub fn new(timeout: Duration) -> Result<Self, IntrospectError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IntrospectError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TorrentIntrospector for HttpTorrentIntrospector {
    async fn episodes(&self, locator: &str) -> Result<EpisodeSet, IntrospectError> {
        if locator.starts_with("magnet:") {
            return Err(IntrospectError::Unsupported(
                "magnet links carry no file list".to_string(),
            ));
        }

        debug!(locator = %locator, "Fetching .torrent file");
        let response = self.client.get(locator).send().await.map_err(|e| {
            if e.is_timeout() {
                IntrospectError::Timeout
            } else {
                IntrospectError::Http(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(IntrospectError::Http(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IntrospectError::Http(e.to_string()))?;

        Ok(episodes_in_files(&torrent_file_paths(&bytes)?))
    }
}

/// File paths of a `.torrent`, root name included.
pub fn torrent_file_paths(bytes: &[u8]) -> Result<Vec<String>, IntrospectError> {
    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| IntrospectError::Parse(e.to_string()))?;
    let info = &torrent.info;

    let root = info
        .name
        .as_ref()
        .map(|b| lossy(b.as_ref()))
        .unwrap_or_else(|| "unknown".to_string());

    match &info.files {
        Some(files) => Ok(files
            .iter()
            .map(|file| {
                std::iter::once(root.clone())
                    .chain(file.path.iter().map(|part| lossy(part.as_ref())))
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect()),
        None if info.length.is_some() => Ok(vec![root]),
        None => Err(IntrospectError::Parse("torrent has no files".to_string())),
    }
}

/// Union of the episodes named by video files.
pub fn episodes_in_files<S: AsRef<str>>(paths: &[S]) -> EpisodeSet {
    paths
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| is_video_file(p))
        .flat_map(|p| parse_release(p).episodes)
        .collect()
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
