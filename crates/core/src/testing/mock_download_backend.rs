//! Mock download backend for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download::{
    DownloadBackend, DownloadError, DownloadRequest, DownloadTask, DownloaderKind, FileSelection,
    TaskFile, TaskState, TaskSummary,
};

#[derive(Debug, Clone)]
struct MockTask {
    id: String,
    request: DownloadRequest,
    files: Vec<TaskFile>,
    started: bool,
}

/// Mock implementation of the DownloadBackend trait.
///
/// Tagged requests come back without an id, so callers have to go through
/// `find_task_by_tag` like they do with a real client.
#[derive(Debug)]
pub struct MockDownloadBackend {
    kind: DownloaderKind,
    supports_selection: AtomicBool,
    register_tasks: Arc<RwLock<bool>>,
    next_error: Arc<RwLock<Option<DownloadError>>>,
    fail_set_files: Arc<RwLock<bool>>,
    files_by_locator: Arc<RwLock<HashMap<String, Vec<String>>>>,
    tasks: Arc<RwLock<Vec<MockTask>>>,
    added: Arc<RwLock<Vec<DownloadRequest>>>,
    selections: Arc<RwLock<HashMap<String, FileSelection>>>,
    deleted: Arc<RwLock<Vec<String>>>,
}

impl MockDownloadBackend {
    pub fn new(kind: DownloaderKind) -> Self {
        Self {
            kind,
            supports_selection: AtomicBool::new(true),
            register_tasks: Arc::new(RwLock::new(true)),
            next_error: Arc::new(RwLock::new(None)),
            fail_set_files: Arc::new(RwLock::new(false)),
            files_by_locator: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(RwLock::new(Vec::new())),
            added: Arc::new(RwLock::new(Vec::new())),
            selections: Arc::new(RwLock::new(HashMap::new())),
            deleted: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// File list a task created from `locator` will report.
    pub async fn set_files_for(&self, locator: &str, names: &[&str]) {
        self.files_by_locator.write().await.insert(
            locator.to_string(),
            names.iter().map(|n| n.to_string()).collect(),
        );
    }

    /// When false, accepted downloads never show up in task lookups.
    pub async fn set_register_tasks(&self, register: bool) {
        *self.register_tasks.write().await = register;
    }

    /// Fail the next `download` call.
    pub async fn set_next_error(&self, error: DownloadError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every `set_files` call fail.
    pub async fn set_fail_set_files(&self, fail: bool) {
        *self.fail_set_files.write().await = fail;
    }

    pub fn set_supports_file_selection(&self, supported: bool) {
        self.supports_selection.store(supported, Ordering::SeqCst);
    }

    /// Every accepted request, in order.
    pub async fn added(&self) -> Vec<DownloadRequest> {
        self.added.read().await.clone()
    }

    pub async fn selection_for(&self, task_id: &str) -> Option<FileSelection> {
        self.selections.read().await.get(task_id).cloned()
    }

    pub async fn started(&self) -> Vec<String> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| t.started)
            .map(|t| t.id.clone())
            .collect()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    fn summary(task: &MockTask, state: TaskState, progress: f64) -> TaskSummary {
        TaskSummary {
            id: task.id.clone(),
            name: task.request.title.clone(),
            state,
            progress,
            size_bytes: task.files.iter().map(|f| f.size_bytes).sum(),
            save_path: task.request.save_dir.clone(),
            category: task.request.category.clone(),
        }
    }
}

#[async_trait]
impl DownloadBackend for MockDownloadBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> DownloaderKind {
        self.kind
    }

    fn supports_file_selection(&self) -> bool {
        self.supports_selection.load(Ordering::SeqCst)
    }

    async fn download(&self, request: &DownloadRequest) -> Result<DownloadTask, DownloadError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        self.added.write().await.push(request.clone());
        let id = format!("task-{}", self.added.read().await.len());

        if *self.register_tasks.read().await {
            let files = self
                .files_by_locator
                .read()
                .await
                .get(&request.locator)
                .map(|names| {
                    names
                        .iter()
                        .enumerate()
                        .map(|(index, name)| TaskFile {
                            index,
                            name: name.clone(),
                            size_bytes: 512 * 1024 * 1024,
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.tasks.write().await.push(MockTask {
                id: id.clone(),
                request: request.clone(),
                files,
                started: !request.paused,
            });
        }

        Ok(DownloadTask {
            id: if request.tag.is_some() { None } else { Some(id) },
        })
    }

    async fn find_task_by_tag(&self, tag: &str) -> Result<Option<String>, DownloadError> {
        Ok(self
            .tasks
            .read()
            .await
            .iter()
            .find(|t| t.request.tag.as_deref() == Some(tag))
            .map(|t| t.id.clone()))
    }

    async fn get_files(&self, task_id: &str) -> Result<Vec<TaskFile>, DownloadError> {
        self.tasks
            .read()
            .await
            .iter()
            .find(|t| t.id == task_id)
            .map(|t| t.files.clone())
            .ok_or_else(|| DownloadError::TaskNotFound(task_id.to_string()))
    }

    async fn set_files(&self, task_id: &str, selection: &FileSelection) -> Result<(), DownloadError> {
        if *self.fail_set_files.read().await {
            return Err(DownloadError::ApiError("setFilePrio rejected".to_string()));
        }
        if !self.tasks.read().await.iter().any(|t| t.id == task_id) {
            return Err(DownloadError::TaskNotFound(task_id.to_string()));
        }
        self.selections
            .write()
            .await
            .insert(task_id.to_string(), selection.clone());
        Ok(())
    }

    async fn start(&self, task_id: &str) -> Result<(), DownloadError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| DownloadError::TaskNotFound(task_id.to_string()))?;
        task.started = true;
        Ok(())
    }

    async fn delete(&self, task_id: &str) -> Result<(), DownloadError> {
        self.tasks.write().await.retain(|t| t.id != task_id);
        self.deleted.write().await.push(task_id.to_string());
        Ok(())
    }

    async fn get_completed(&self) -> Result<Vec<TaskSummary>, DownloadError> {
        Ok(Vec::new())
    }

    async fn get_downloading(&self) -> Result<Vec<TaskSummary>, DownloadError> {
        Ok(self
            .tasks
            .read()
            .await
            .iter()
            .map(|t| {
                let state = if t.started {
                    TaskState::Downloading
                } else {
                    TaskState::Paused
                };
                Self::summary(t, state, 0.0)
            })
            .collect())
    }
}
