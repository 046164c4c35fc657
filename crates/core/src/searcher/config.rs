use serde::{Deserialize, Serialize};

/// Search behaviour configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search with the original-language title first.
    #[serde(default)]
    pub prefer_foreign_title: bool,

    /// Download straight away for interactive (chat) searches.
    #[serde(default = "default_auto_download_interactive")]
    pub auto_download_interactive: bool,

    /// Sites queried concurrently per keyword.
    #[serde(default = "default_max_parallel_sites")]
    pub max_parallel_sites: usize,
}

fn default_auto_download_interactive() -> bool {
    true
}

fn default_max_parallel_sites() -> usize {
    4
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            prefer_foreign_title: false,
            auto_download_interactive: default_auto_download_interactive(),
            max_parallel_sites: default_max_parallel_sites(),
        }
    }
}
