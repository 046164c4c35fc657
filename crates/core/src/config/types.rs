use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::searcher::SearchConfig;
use crate::selection::SelectionConfig;
use crate::subscription::SubscriptionConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    /// Quality rule groups used to rank and filter candidates.
    #[serde(default)]
    pub rule_groups: Vec<RuleGroupConfig>,
    /// Rule group applied when a subscription does not name one.
    #[serde(default)]
    pub default_rule_group: Option<String>,
    #[serde(default)]
    pub indexer: Option<IndexerConfig>,
    #[serde(default)]
    pub download_client: Option<DownloadClientConfig>,
    #[serde(default)]
    pub tmdb: Option<TmdbConfig>,
}

/// Operator endpoint configuration (health and metrics).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    9090
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("gapfill.db")
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human readable format.
    #[serde(default)]
    pub json: bool,
}

/// A named set of quality rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleGroupConfig {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<QualityRuleConfig>,
}

/// One quality rule. Lower priority values rank better.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QualityRuleConfig {
    pub name: String,
    pub priority: u32,
    /// Regex patterns that must all match the title or description.
    #[serde(default)]
    pub include: Vec<String>,
    /// Regex patterns that must all be absent.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Minimum size in GB (whole movie, or per episode for TV).
    #[serde(default)]
    pub min_size_gb: Option<f64>,
    #[serde(default)]
    pub max_size_gb: Option<f64>,
    /// Promotion requirement as "<min upload factor> <max download factor>", e.g. "1.0 0.0".
    #[serde(default)]
    pub promotion: Option<String>,
}

/// Indexer backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
    pub backend: IndexerBackend,
    /// Jackett-specific configuration (required when backend = "jackett")
    #[serde(default)]
    pub jackett: Option<JackettConfig>,
}

/// Available indexer backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexerBackend {
    Jackett,
}

/// Jackett indexer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JackettConfig {
    /// Jackett server URL (e.g., "http://localhost:9117")
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Sites queried through this Jackett instance.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// A single indexer site.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Jackett indexer id.
    pub name: String,
    /// Public trackers skip the zero-seeder check.
    #[serde(default)]
    pub public: bool,
    /// Site rank used in ordering, lower is preferred.
    #[serde(default = "default_site_rank")]
    pub rank: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_site_rank() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u32 {
    30
}

/// Download client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    pub backend: DownloadClientBackend,
    #[serde(default)]
    pub qbittorrent: Option<QBittorrentConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadClientBackend {
    #[serde(rename = "qbittorrent")]
    QBittorrent,
}

/// qBittorrent Web API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QBittorrentConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

/// TMDB identity resolver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    pub api_key: String,
    /// Base URL (default: https://api.themoviedb.org/3).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Language used for the localized title (e.g. "zh-CN").
    #[serde(default)]
    pub language: Option<String>,
}

/// Sanitized config for operator output (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub search: SearchConfig,
    pub selection: SelectionConfig,
    pub subscription: SubscriptionConfig,
    pub rule_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_rule_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer: Option<SanitizedIndexerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_client: Option<SanitizedDownloadClientConfig>,
    pub tmdb_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedIndexerConfig {
    pub backend: String,
    pub url: Option<String>,
    pub api_key_configured: bool,
    pub sites: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDownloadClientConfig {
    pub backend: String,
    pub url: Option<String>,
    pub username: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            search: config.search.clone(),
            selection: config.selection.clone(),
            subscription: config.subscription.clone(),
            rule_groups: config.rule_groups.iter().map(|g| g.name.clone()).collect(),
            default_rule_group: config.default_rule_group.clone(),
            indexer: config.indexer.as_ref().map(|i| SanitizedIndexerConfig {
                backend: match i.backend {
                    IndexerBackend::Jackett => "jackett".to_string(),
                },
                url: i.jackett.as_ref().map(|j| j.url.clone()),
                api_key_configured: i
                    .jackett
                    .as_ref()
                    .map(|j| !j.api_key.is_empty())
                    .unwrap_or(false),
                sites: i
                    .jackett
                    .as_ref()
                    .map(|j| j.sites.iter().map(|s| s.name.clone()).collect())
                    .unwrap_or_default(),
            }),
            download_client: config
                .download_client
                .as_ref()
                .map(|d| SanitizedDownloadClientConfig {
                    backend: match d.backend {
                        DownloadClientBackend::QBittorrent => "qbittorrent".to_string(),
                    },
                    url: d.qbittorrent.as_ref().map(|q| q.url.clone()),
                    username: d.qbittorrent.as_ref().map(|q| q.username.clone()),
                }),
            tmdb_configured: config
                .tmdb
                .as_ref()
                .map(|t| !t.api_key.is_empty())
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.path, PathBuf::from("gapfill.db"));
        assert!(!config.logging.json);
        assert!(config.indexer.is_none());
        assert!(config.rule_groups.is_empty());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
default_rule_group = "hd"

[server]
host = "127.0.0.1"
port = 9191

[search]
prefer_foreign_title = true
max_parallel_sites = 2

[selection]
download_order = "seeders"
tv_dir = "/media/tv"

[[rule_groups]]
name = "hd"

[[rule_groups.rules]]
name = "remux"
priority = 10
include = ["remux"]

[[rule_groups.rules]]
name = "1080p"
priority = 20
include = ["1080p"]
exclude = ["cam"]
max_size_gb = 8.0

[indexer]
backend = "jackett"

[indexer.jackett]
url = "http://localhost:9117"
api_key = "secret"

[[indexer.jackett.sites]]
name = "tracker-a"
rank = 1

[[indexer.jackett.sites]]
name = "public-b"
public = true

[download_client]
backend = "qbittorrent"

[download_client.qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "adminadmin"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9191);
        assert!(config.search.prefer_foreign_title);
        assert_eq!(config.search.max_parallel_sites, 2);
        assert_eq!(config.rule_groups.len(), 1);
        assert_eq!(config.rule_groups[0].rules[1].max_size_gb, Some(8.0));

        let jackett = config.indexer.unwrap().jackett.unwrap();
        assert_eq!(jackett.sites.len(), 2);
        assert_eq!(jackett.sites[0].rank, 1);
        assert!(!jackett.sites[0].public);
        assert!(jackett.sites[1].public);
        assert_eq!(jackett.sites[1].rank, 50);
        assert!(jackett.sites[1].enabled);

        let qb = config.download_client.unwrap();
        assert_eq!(qb.backend, DownloadClientBackend::QBittorrent);
        assert_eq!(qb.qbittorrent.unwrap().timeout_secs, 30);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config: Config = toml::from_str(
            r#"
[indexer]
backend = "jackett"

[indexer.jackett]
url = "http://localhost:9117"
api_key = "super-secret"

[download_client]
backend = "qbittorrent"

[download_client.qbittorrent]
url = "http://localhost:8080"
username = "admin"
password = "hunter2"

[tmdb]
api_key = "tmdb-secret"
"#,
        )
        .unwrap();

        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("tmdb-secret"));
        assert!(sanitized.indexer.unwrap().api_key_configured);
        assert!(sanitized.tmdb_configured);
    }
}
