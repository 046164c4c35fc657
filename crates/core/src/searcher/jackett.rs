//! Jackett indexer backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::classifier::FilterArgs;
use crate::config::JackettConfig;
use crate::media::MediaType;

use super::{Indexer, IndexerError, IndexerSite, RawCandidate};

/// Queries individual Jackett indexers, one site per request.
pub struct JackettIndexer {
    client: Client,
    config: JackettConfig,
}

impl JackettIndexer {
    pub fn new(config: JackettConfig) -> Result<Self, IndexerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| IndexerError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Build the Jackett API URL for one site.
    fn build_search_url(&self, site: &str, keyword: &str, media_type: Option<MediaType>) -> String {
        let mut url = format!(
            "{}/api/v2.0/indexers/{}/results?apikey={}&Query={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(site),
            urlencoding::encode(&self.config.api_key),
            urlencoding::encode(keyword)
        );

        for cat_id in category_ids(media_type) {
            url.push_str(&format!("&Category[]={}", cat_id));
        }

        url
    }
}

#[async_trait]
impl Indexer for JackettIndexer {
    fn name(&self) -> &str {
        "jackett"
    }

    fn sites(&self) -> Vec<IndexerSite> {
        self.config
            .sites
            .iter()
            .filter(|s| s.enabled)
            .map(|s| IndexerSite {
                name: s.name.clone(),
                public: s.public,
                rank: s.rank,
            })
            .collect()
    }

    async fn search(
        &self,
        site: &IndexerSite,
        keyword: &str,
        args: &FilterArgs,
    ) -> Result<Vec<RawCandidate>, IndexerError> {
        if !self.config.sites.iter().any(|s| s.name == site.name) {
            return Err(IndexerError::SiteNotFound(site.name.clone()));
        }

        let url = self.build_search_url(&site.name, keyword, args.media_type);
        debug!(site = %site.name, keyword = keyword, "Searching Jackett");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexerError::Timeout
            } else if e.is_connect() {
                IndexerError::ConnectionFailed(e.to_string())
            } else {
                IndexerError::ApiError(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexerError::ApiError(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let jackett_response: JackettResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::ApiError(format!("Failed to parse response: {}", e)))?;

        debug!(
            site = %site.name,
            results = jackett_response.Results.len(),
            "Jackett search complete"
        );

        Ok(jackett_response
            .Results
            .into_iter()
            .filter_map(|r| into_candidate(r, &site.name))
            .collect())
    }
}

/// Hits without any download locator are dropped.
fn into_candidate(r: JackettResult, site: &str) -> Option<RawCandidate> {
    let locator = r.Link.or(r.MagnetUri)?;
    let seeders = r.Seeders.map(|s| s.max(0) as u32);
    Some(RawCandidate {
        title: r.Title,
        description: r.Description.filter(|d| !d.trim().is_empty()),
        site: site.to_string(),
        size_bytes: r.Size.unwrap_or(0).max(0) as u64,
        seeders,
        peers: r
            .Peers
            .unwrap_or(0)
            .saturating_sub(r.Seeders.unwrap_or(0))
            .max(0) as u32,
        locator,
        page_url: r.Details.or(r.Guid),
        imdb_id: r.Imdb.filter(|id| *id > 0).map(|id| format!("tt{:07}", id)),
        upload_factor: r.UploadVolumeFactor.unwrap_or(1.0),
        download_factor: r.DownloadVolumeFactor.unwrap_or(1.0),
    })
}

/// Newznab category ids for a media type.
fn category_ids(media_type: Option<MediaType>) -> Vec<i32> {
    match media_type {
        Some(MediaType::Movie) => vec![2000],
        Some(MediaType::Tv) => vec![5000],
        None => vec![2000, 5000],
    }
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResponse {
    Results: Vec<JackettResult>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JackettResult {
    Title: String,
    Description: Option<String>,
    MagnetUri: Option<String>,
    Link: Option<String>,
    Guid: Option<String>,
    Details: Option<String>,
    Size: Option<i64>,
    Seeders: Option<i32>,
    Peers: Option<i32>,
    Imdb: Option<i64>,
    UploadVolumeFactor: Option<f64>,
    DownloadVolumeFactor: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;

    fn config(url: &str) -> JackettConfig {
        JackettConfig {
            url: url.to_string(),
            api_key: "test-key".to_string(),
            timeout_secs: 30,
            sites: vec![
                SiteConfig {
                    name: "alpha".to_string(),
                    public: false,
                    rank: 1,
                    enabled: true,
                },
                SiteConfig {
                    name: "beta".to_string(),
                    public: true,
                    rank: 2,
                    enabled: false,
                },
            ],
        }
    }

    #[test]
    fn test_build_search_url() {
        let indexer = JackettIndexer::new(config("http://localhost:9117/")).unwrap();
        let url = indexer.build_search_url("alpha", "some show", Some(MediaType::Tv));
        assert!(url.starts_with("http://localhost:9117/api/v2.0/indexers/alpha/results"));
        assert!(url.contains("apikey=test-key"));
        assert!(url.contains("Query=some%20show"));
        assert!(url.contains("Category[]=5000"));
        assert!(!url.contains("Category[]=2000"));
    }

    #[test]
    fn test_sites_skip_disabled() {
        let indexer = JackettIndexer::new(config("http://localhost:9117")).unwrap();
        let sites = indexer.sites();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "alpha");
        assert!(!sites[0].public);
    }

    #[test]
    fn test_result_conversion() {
        let json = r#"{"Results":[
            {"Title":"Show.S01E01.1080p","Link":"http://x/1.torrent","Size":1000,
             "Seeders":5,"Peers":8,"Imdb":1234,"DownloadVolumeFactor":0.0,
             "Description":"  "},
            {"Title":"No.Locator.S01E02","Size":10}
        ]}"#;
        let response: JackettResponse = serde_json::from_str(json).unwrap();
        let candidates: Vec<_> = response
            .Results
            .into_iter()
            .filter_map(|r| into_candidate(r, "alpha"))
            .collect();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.seeders, Some(5));
        assert_eq!(c.peers, 3);
        assert_eq!(c.imdb_id.as_deref(), Some("tt0001234"));
        assert_eq!(c.download_factor, 0.0);
        assert_eq!(c.upload_factor, 1.0);
        assert!(c.description.is_none());
    }

    #[test]
    fn test_category_ids() {
        assert_eq!(category_ids(Some(MediaType::Movie)), vec![2000]);
        assert_eq!(category_ids(None), vec![2000, 5000]);
    }

    #[tokio::test]
    async fn test_unknown_site() {
        let indexer = JackettIndexer::new(config("http://127.0.0.1:1")).unwrap();
        let site = IndexerSite {
            name: "gamma".to_string(),
            public: true,
            rank: 9,
        };
        let result = indexer.search(&site, "x", &FilterArgs::default()).await;
        assert!(matches!(result, Err(IndexerError::SiteNotFound(_))));
    }
}
