use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::media::EpisodeSet;

use super::partial::select_files;
use super::{
    DownloadBackend, DownloadError, DownloadRequest, DownloadTask, FileSelection, PollPolicy,
    TaskOverview,
};

/// Result of a paused, file-selected download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialOutcome {
    /// Task resumed with only the matched files selected.
    Started { task_id: String, matched: EpisodeSet },
    /// No file carried a needed episode; the task was deleted.
    NothingMatched,
    /// The task never showed up (or listed no files) within the poll window.
    TaskNotFound,
}

/// Explicit handle on the download backend.
///
/// Holds its own lock across every download, select and resume sequence so a
/// task is never reconfigured concurrently.
pub struct DownloadClient {
    backend: Arc<dyn DownloadBackend>,
    lock: Mutex<()>,
    poll: PollPolicy,
}

impl DownloadClient {
    pub fn new(backend: Arc<dyn DownloadBackend>, poll: PollPolicy) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
            poll,
        }
    }

    pub fn backend(&self) -> &dyn DownloadBackend {
        self.backend.as_ref()
    }

    pub fn supports_file_selection(&self) -> bool {
        self.backend.supports_file_selection()
    }

    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadTask, DownloadError> {
        let _guard = self.lock.lock().await;
        let task = self.backend.download(request).await?;
        info!(
            backend = self.backend.name(),
            title = %request.title,
            task_id = task.id.as_deref().unwrap_or("-"),
            "Download added"
        );
        Ok(task)
    }

    /// Active and finished tasks; does not take the download lock.
    pub async fn overview(&self) -> Result<TaskOverview, DownloadError> {
        let downloading = self.backend.get_downloading().await?;
        let completed = self.backend.get_completed().await?;
        Ok(TaskOverview {
            downloading,
            completed,
        })
    }

    /// Add paused under a unique tag, keep only files carrying `needed`
    /// episodes, then resume.
    pub async fn download_partial(
        &self,
        request: DownloadRequest,
        needed: &EpisodeSet,
    ) -> Result<PartialOutcome, DownloadError> {
        let _guard = self.lock.lock().await;

        let tag = format!("gf{}", Uuid::new_v4().simple());
        let request = request.with_paused(true).with_tag(tag.clone());
        let task = self.backend.download(&request).await?;

        let backend = self.backend.as_ref();
        let task_id = match task.id {
            Some(id) => Some(id),
            None => {
                let tag = tag.as_str();
                self.poll
                    .until("task", move || async move {
                        backend.find_task_by_tag(tag).await.ok().flatten()
                    })
                    .await
            }
        };
        let Some(task_id) = task_id else {
            warn!(title = %request.title, tag = %tag, "Paused task not found");
            return Ok(PartialOutcome::TaskNotFound);
        };

        let id = task_id.as_str();
        let files = self
            .poll
            .until("files", move || async move {
                backend
                    .get_files(id)
                    .await
                    .ok()
                    .filter(|files| !files.is_empty())
            })
            .await;
        let Some(files) = files else {
            warn!(title = %request.title, task_id = %task_id, "Task listed no files");
            self.backend.delete(&task_id).await?;
            return Ok(PartialOutcome::TaskNotFound);
        };

        let style = self.backend.kind().selection_style();
        let partial = select_files(&files, needed, style);
        if partial.matched.is_empty() {
            debug!(title = %request.title, task_id = %task_id, "No needed episode in task");
            self.backend.delete(&task_id).await?;
            return Ok(PartialOutcome::NothingMatched);
        }

        if let Err(e) = self.resume_selected(&task_id, &partial.selection).await {
            // The paused task would otherwise linger with every file selected
            if let Err(cleanup) = self.backend.delete(&task_id).await {
                warn!(task_id = %task_id, error = %cleanup, "Failed to delete task");
            }
            return Err(e);
        }
        info!(
            title = %request.title,
            task_id = %task_id,
            matched = ?partial.matched,
            "Partial download started"
        );

        Ok(PartialOutcome::Started {
            task_id,
            matched: partial.matched,
        })
    }

    async fn resume_selected(
        &self,
        task_id: &str,
        selection: &FileSelection,
    ) -> Result<(), DownloadError> {
        self.backend.set_files(task_id, selection).await?;
        self.backend.start(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloaderKind, FileSelection};
    use crate::testing::MockDownloadBackend;
    use std::time::Duration;

    fn client(backend: Arc<MockDownloadBackend>) -> DownloadClient {
        DownloadClient::new(backend, PollPolicy::new(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_partial_keeps_needed_files() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::Transmission));
        backend
            .set_files_for(
                "http://x/pack.torrent",
                &["Pack/Show.S01E01.mkv", "Pack/Show.S01E02.mkv", "Pack/Show.S01E05.mkv"],
            )
            .await;
        let client = client(backend.clone());

        let outcome = client
            .download_partial(
                DownloadRequest::new("http://x/pack.torrent", "Show S01"),
                &EpisodeSet::from([1, 2]),
            )
            .await
            .unwrap();

        let PartialOutcome::Started { task_id, matched } = outcome else {
            panic!("expected a started task");
        };
        assert_eq!(matched, EpisodeSet::from([1, 2]));
        assert_eq!(
            backend.selection_for(&task_id).await,
            Some(FileSelection::Mask {
                keep: vec![0, 1],
                drop: vec![2],
            })
        );
        assert!(backend.started().await.contains(&task_id));

        let added = backend.added().await;
        assert_eq!(added.len(), 1);
        assert!(added[0].paused);
        assert!(added[0].tag.as_deref().unwrap().starts_with("gf"));
    }

    #[tokio::test]
    async fn test_partial_deletes_when_nothing_matches() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        backend
            .set_files_for("http://x/pack.torrent", &["Pack/Show.S01E07.mkv"])
            .await;
        let client = client(backend.clone());

        let outcome = client
            .download_partial(
                DownloadRequest::new("http://x/pack.torrent", "Show S01"),
                &EpisodeSet::from([1]),
            )
            .await
            .unwrap();

        assert_eq!(outcome, PartialOutcome::NothingMatched);
        assert_eq!(backend.deleted().await.len(), 1);
        assert!(backend.started().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_deletes_task_when_selection_fails() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        backend
            .set_files_for("http://x/pack.torrent", &["Pack/Show.S01E01.mkv"])
            .await;
        backend.set_fail_set_files(true).await;
        let client = client(backend.clone());

        let result = client
            .download_partial(
                DownloadRequest::new("http://x/pack.torrent", "Show S01"),
                &EpisodeSet::from([1]),
            )
            .await;

        assert!(matches!(result, Err(DownloadError::ApiError(_))));
        assert_eq!(backend.deleted().await, vec!["task-1".to_string()]);
        assert!(backend.started().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_task_not_registered() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        backend.set_register_tasks(false).await;
        let client = client(backend.clone());

        let outcome = client
            .download_partial(
                DownloadRequest::new("http://x/pack.torrent", "Show S01"),
                &EpisodeSet::from([1]),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PartialOutcome::TaskNotFound);
    }

    #[tokio::test]
    async fn test_overview_lists_tasks() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        let client = client(backend);

        client
            .download(&DownloadRequest::new("http://x/a.torrent", "Film"))
            .await
            .unwrap();

        let overview = client.overview().await.unwrap();
        assert_eq!(overview.downloading.len(), 1);
        assert!(overview.completed.is_empty());
    }

    #[tokio::test]
    async fn test_rejection_propagates() {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        backend
            .set_next_error(DownloadError::Rejected("full".to_string()))
            .await;
        let client = client(backend);

        let result = client
            .download(&DownloadRequest::new("http://x/a.torrent", "Film"))
            .await;
        assert!(matches!(result, Err(DownloadError::Rejected(_))));
    }
}
