//! qBittorrent download backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::QBittorrentConfig;

use super::{
    DownloadBackend, DownloadError, DownloadRequest, DownloadTask, DownloaderKind, FilePriority,
    FileSelection, TaskFile, TaskState, TaskSummary,
};

/// qBittorrent Web API client.
pub struct QBittorrentBackend {
    client: Client,
    config: QBittorrentConfig,
    /// Set once logged in; cleared when the session expires.
    session: Arc<RwLock<Option<String>>>,
}

impl QBittorrentBackend {
    pub fn new(config: QBittorrentConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .cookie_store(true)
            .build()
            .map_err(|e| DownloadError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(None)),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Login and keep the session cookie in the jar.
    async fn login(&self) -> Result<(), DownloadError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.session.write().await = Some("authenticated".to_string());
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(DownloadError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloadError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }
        self.login().await
    }

    /// Send a request, logging in again once if the session expired.
    async fn send<F>(&self, build: F) -> Result<String, DownloadError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.ensure_authenticated().await?;

        let mut response = build().send().await.map_err(map_transport_error)?;
        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.session.write().await = None;
            self.login().await?;
            response = build().send().await.map_err(map_transport_error)?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::ApiError(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| DownloadError::ApiError(e.to_string()))
    }

    async fn get(&self, endpoint: &str) -> Result<String, DownloadError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.send(|| self.client.get(&url)).await
    }

    async fn post_form(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, DownloadError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        self.send(|| self.client.post(&url).form(params)).await
    }

    async fn list(&self, filter: &str) -> Result<Vec<TaskSummary>, DownloadError> {
        let body = self
            .get(&format!("/api/v2/torrents/info?filter={}", filter))
            .await?;
        let torrents: Vec<QbTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| DownloadError::ApiError(format!("Failed to parse response: {}", e)))?;
        Ok(torrents.into_iter().map(QbTorrentInfo::into_summary).collect())
    }
}

fn map_transport_error(e: reqwest::Error) -> DownloadError {
    if e.is_timeout() {
        DownloadError::Timeout
    } else if e.is_connect() {
        DownloadError::ConnectionFailed(e.to_string())
    } else {
        DownloadError::ApiError(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct QbTorrentInfo {
    hash: String,
    name: String,
    state: String,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    category: String,
}

impl QbTorrentInfo {
    fn into_summary(self) -> TaskSummary {
        TaskSummary {
            id: self.hash.to_lowercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            save_path: Some(self.save_path).filter(|p| !p.is_empty()),
            category: Some(self.category).filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QbFile {
    /// Missing on older Web API versions; position is used instead.
    index: Option<usize>,
    name: String,
    #[serde(default)]
    size: i64,
}

fn parse_qb_state(state: &str) -> TaskState {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "allocating" => TaskState::Downloading,
        "uploading" | "forcedUP" => TaskState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TaskState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" | "moving" => TaskState::Checking,
        "queuedDL" | "queuedUP" => TaskState::Queued,
        "stalledDL" | "stalledUP" => TaskState::Stalled,
        "error" | "missingFiles" => TaskState::Error,
        _ => TaskState::Unknown,
    }
}

/// Extract the info hash from a magnet URI.
fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .map(|hash| hash.to_lowercase())
}

/// Group a selection into `filePrio` calls: priority value to pipe-joined ids.
fn priority_batches(selection: &FileSelection) -> BTreeMap<u8, String> {
    let entries: Vec<(usize, FilePriority)> = match selection {
        FileSelection::Priorities(entries) => entries.clone(),
        FileSelection::Mask { keep, drop } => keep
            .iter()
            .map(|i| (*i, FilePriority::Normal))
            .chain(drop.iter().map(|i| (*i, FilePriority::Skip)))
            .collect(),
    };

    let mut batches: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    for (index, priority) in entries {
        let value = match priority {
            FilePriority::Skip => 0,
            FilePriority::Normal => 1,
        };
        batches.entry(value).or_default().push(index.to_string());
    }
    batches
        .into_iter()
        .map(|(prio, ids)| (prio, ids.join("|")))
        .collect()
}

#[async_trait]
impl DownloadBackend for QBittorrentBackend {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    fn kind(&self) -> DownloaderKind {
        DownloaderKind::QBittorrent
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadTask, DownloadError> {
        let build_form = || {
            let mut form = multipart::Form::new().text("urls", request.locator.clone());
            if let Some(dir) = &request.save_dir {
                form = form.text("savepath", dir.clone());
            }
            if let Some(category) = &request.category {
                form = form.text("category", category.clone());
            }
            if let Some(tag) = &request.tag {
                form = form.text("tags", tag.clone());
            }
            if request.paused {
                form = form.text("paused", "true").text("stopped", "true");
            }
            form
        };

        let url = format!("{}/api/v2/torrents/add", self.base_url());
        let body = self
            .send(|| self.client.post(&url).multipart(build_form()))
            .await?;
        if body.trim() == "Fails." {
            return Err(DownloadError::Rejected(format!(
                "qBittorrent refused '{}'",
                request.title
            )));
        }

        Ok(DownloadTask {
            id: extract_hash_from_magnet(&request.locator),
        })
    }

    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>, DownloadError> {
        let body = self
            .get(&format!(
                "/api/v2/torrents/info?tag={}",
                urlencoding::encode(tag)
            ))
            .await?;
        let torrents: Vec<QbTorrentInfo> = serde_json::from_str(&body)
            .map_err(|e| DownloadError::ApiError(format!("Failed to parse response: {}", e)))?;
        Ok(torrents.into_iter().next().map(|t| t.hash.to_lowercase()))
    }

    async fn get_files(&self, task_id: &str) -> Result<Vec<TaskFile>, DownloadError> {
        let body = self
            .get(&format!("/api/v2/torrents/files?hash={}", task_id.to_lowercase()))
            .await?;
        let files: Vec<QbFile> = serde_json::from_str(&body)
            .map_err(|e| DownloadError::ApiError(format!("Failed to parse response: {}", e)))?;
        Ok(files
            .into_iter()
            .enumerate()
            .map(|(position, f)| TaskFile {
                index: f.index.unwrap_or(position),
                name: f.name,
                size_bytes: f.size.max(0) as u64,
            })
            .collect())
    }

    async fn set_files(
        &self,
        task_id: &str,
        selection: &FileSelection,
    ) -> Result<(), DownloadError> {
        let hash = task_id.to_lowercase();
        for (priority, ids) in priority_batches(selection) {
            let priority = priority.to_string();
            self.post_form(
                "/api/v2/torrents/filePrio",
                &[("hash", &hash), ("id", &ids), ("priority", &priority)],
            )
            .await?;
        }
        Ok(())
    }

    async fn start(&self, task_id: &str) -> Result<(), DownloadError> {
        let hash = task_id.to_lowercase();
        self.post_form("/api/v2/torrents/resume", &[("hashes", &hash)])
            .await?;
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> Result<(), DownloadError> {
        let hash = task_id.to_lowercase();
        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", &hash), ("deleteFiles", "true")],
        )
        .await?;
        Ok(())
    }

    async fn get_completed(&self) -> Result<Vec<TaskSummary>, DownloadError> {
        self.list("completed").await
    }

    async fn get_downloading(&self) -> Result<Vec<TaskSummary>, DownloadError> {
        self.list("downloading").await
    }
}
