use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::download::PollPolicy;

/// Tie-break between equally ranked candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOrder {
    /// Prefer the better ranked site, then more seeders.
    #[default]
    Site,
    /// Prefer more seeders, then the better ranked site.
    Seeders,
}

/// Selection engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub download_order: DownloadOrder,

    /// Attempts when waiting for a paused task to register.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Save directory for movies; the client default when unset.
    #[serde(default)]
    pub movie_dir: Option<String>,

    /// Save directory for TV.
    #[serde(default)]
    pub tv_dir: Option<String>,

    /// Download client category applied to every task.
    #[serde(default)]
    pub category: Option<String>,
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl SelectionConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.poll_attempts,
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            download_order: DownloadOrder::default(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            movie_dir: None,
            tv_dir: None,
            category: None,
        }
    }
}
