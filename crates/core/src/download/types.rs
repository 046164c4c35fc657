//! Types for download backend operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during download backend operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Download rejected: {0}")]
    Rejected(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// Concrete download client family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderKind {
    QBittorrent,
    Transmission,
}

impl DownloaderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloaderKind::QBittorrent => "qbittorrent",
            DownloaderKind::Transmission => "transmission",
        }
    }

    /// How this client expects per-file selections.
    pub fn selection_style(&self) -> SelectionStyle {
        match self {
            DownloaderKind::QBittorrent => SelectionStyle::Priority,
            DownloaderKind::Transmission => SelectionStyle::Mask,
        }
    }
}

/// Encoding of a per-file selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStyle {
    /// Per-file priorities, `Skip` for dropped files.
    Priority,
    /// Index lists of wanted and unwanted files.
    Mask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePriority {
    Skip,
    Normal,
}

/// Files to keep and drop inside one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelection {
    Mask { keep: Vec<usize>, drop: Vec<usize> },
    Priorities(Vec<(usize, FilePriority)>),
}

impl FileSelection {
    /// Indexes of files that stay selected.
    pub fn kept(&self) -> Vec<usize> {
        match self {
            FileSelection::Mask { keep, .. } => keep.clone(),
            FileSelection::Priorities(entries) => entries
                .iter()
                .filter(|(_, p)| *p != FilePriority::Skip)
                .map(|(i, _)| *i)
                .collect(),
        }
    }
}

/// A file inside a download task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    pub index: usize,
    /// Path relative to the task root.
    pub name: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Coarse task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Downloading,
    Seeding,
    Paused,
    Checking,
    Queued,
    Stalled,
    Error,
    Unknown,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Downloading => "downloading",
            TaskState::Seeding => "seeding",
            TaskState::Paused => "paused",
            TaskState::Checking => "checking",
            TaskState::Queued => "queued",
            TaskState::Stalled => "stalled",
            TaskState::Error => "error",
            TaskState::Unknown => "unknown",
        }
    }
}

/// Listing entry for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub state: TaskState,
    /// 0.0 - 1.0
    pub progress: f64,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Snapshot of the backend's task lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskOverview {
    pub downloading: Vec<TaskSummary>,
    pub completed: Vec<TaskSummary>,
}

/// Request to start a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// `.torrent` URL or magnet URI.
    pub locator: String,
    /// Release title, for logging.
    pub title: String,
    pub paused: bool,
    /// Unique tag used to find the task again.
    pub tag: Option<String>,
    pub save_dir: Option<String>,
    pub category: Option<String>,
}

impl DownloadRequest {
    pub fn new(locator: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            title: title.into(),
            paused: false,
            tag: None,
            save_dir: None,
            category: None,
        }
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_save_dir(mut self, dir: Option<String>) -> Self {
        self.save_dir = dir;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }
}

/// Handle of a task the backend accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    /// Known immediately for magnets; otherwise found later by tag.
    pub id: Option<String>,
}

/// Trait for download client backends.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    fn kind(&self) -> DownloaderKind;

    /// Whether individual files can be deselected inside a task.
    fn supports_file_selection(&self) -> bool {
        true
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadTask, DownloadError>;

    /// Id of the task carrying `tag`, if registered yet.
    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>, DownloadError>;

    async fn get_files(&self, task_id: &str) -> Result<Vec<TaskFile>, DownloadError>;

    async fn set_files(&self, task_id: &str, selection: &FileSelection)
        -> Result<(), DownloadError>;

    async fn start(&self, task_id: &str) -> Result<(), DownloadError>;

    /// Remove a task together with its data.
    async fn delete(&self, task_id: &str) -> Result<(), DownloadError>;

    async fn get_completed(&self) -> Result<Vec<TaskSummary>, DownloadError>;

    async fn get_downloading(&self) -> Result<Vec<TaskSummary>, DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_style_per_kind() {
        assert_eq!(
            DownloaderKind::QBittorrent.selection_style(),
            SelectionStyle::Priority
        );
        assert_eq!(
            DownloaderKind::Transmission.selection_style(),
            SelectionStyle::Mask
        );
    }

    #[test]
    fn test_kept_files() {
        let mask = FileSelection::Mask {
            keep: vec![0, 2],
            drop: vec![1],
        };
        assert_eq!(mask.kept(), vec![0, 2]);

        let prio = FileSelection::Priorities(vec![
            (0, FilePriority::Normal),
            (1, FilePriority::Skip),
            (2, FilePriority::Normal),
        ]);
        assert_eq!(prio.kept(), vec![0, 2]);
    }

    #[test]
    fn test_request_builder() {
        let req = DownloadRequest::new("magnet:?xt=urn:btih:abc", "Show S01")
            .with_paused(true)
            .with_tag("gf123")
            .with_save_dir(Some("/tv".to_string()))
            .with_category(None);
        assert!(req.paused);
        assert_eq!(req.tag.as_deref(), Some("gf123"));
        assert_eq!(req.save_dir.as_deref(), Some("/tv"));
        assert!(req.category.is_none());
    }

    #[test]
    fn test_task_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskState::Downloading).unwrap(),
            "\"downloading\""
        );
        assert_eq!(TaskState::Stalled.as_str(), "stalled");
    }
}
