//! Event sink that keeps everything it receives.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::events::{AcquisitionEvent, EventSink};

#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Arc<RwLock<Vec<AcquisitionEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AcquisitionEvent> {
        self.events.read().await.clone()
    }

    pub async fn download_failures(&self) -> usize {
        self.count(|e| matches!(e, AcquisitionEvent::DownloadFailed { .. }))
            .await
    }

    /// `(title, partial)` of every started download.
    pub async fn downloads_started(&self) -> Vec<(String, bool)> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                AcquisitionEvent::DownloadStarted { title, partial, .. } => {
                    Some((title.clone(), *partial))
                }
                _ => None,
            })
            .collect()
    }

    /// Ids of finished subscriptions.
    pub async fn finished(&self) -> Vec<i64> {
        self.events
            .read()
            .await
            .iter()
            .filter_map(|e| match e {
                AcquisitionEvent::SubscriptionFinished {
                    subscription_id, ..
                } => Some(*subscription_id),
                _ => None,
            })
            .collect()
    }

    pub async fn indexer_failures(&self) -> usize {
        self.count(|e| matches!(e, AcquisitionEvent::IndexerFailed { .. }))
            .await
    }

    async fn count(&self, pred: impl Fn(&AcquisitionEvent) -> bool) -> usize {
        self.events.read().await.iter().filter(|e| pred(e)).count()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn emit(&self, event: AcquisitionEvent) {
        self.events.write().await.push(event);
    }
}
