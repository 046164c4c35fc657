//! Notifications emitted while searching and downloading.
//!
//! Delivery (chat, mail, push) lives outside this crate; the core only hands
//! events to an `EventSink`.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::media::{MediaType, SearchOrigin};

/// Accept/reject tallies for one indexer batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyTally {
    pub accepted: usize,
    pub rule_fail: usize,
    pub no_match: usize,
    pub error: usize,
}

impl ClassifyTally {
    pub fn total(&self) -> usize {
        self.accepted + self.rule_fail + self.no_match + self.error
    }
}

/// Something worth telling the outside world about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcquisitionEvent {
    SearchProgress {
        site: String,
        keyword: String,
        tally: ClassifyTally,
    },
    IndexerFailed {
        site: String,
        error: String,
    },
    DownloadStarted {
        origin: SearchOrigin,
        title: String,
        media_type: MediaType,
        site: String,
        partial: bool,
    },
    DownloadFailed {
        title: String,
        reason: String,
    },
    SubscriptionFinished {
        subscription_id: i64,
        name: String,
    },
}

/// Receives acquisition events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: AcquisitionEvent);
}

/// Sink that only writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn emit(&self, event: AcquisitionEvent) {
        match &event {
            AcquisitionEvent::SearchProgress {
                site,
                keyword,
                tally,
            } => info!(
                site = %site,
                keyword = %keyword,
                accepted = tally.accepted,
                rule_fail = tally.rule_fail,
                no_match = tally.no_match,
                error = tally.error,
                "Indexer batch classified"
            ),
            AcquisitionEvent::IndexerFailed { site, error } => {
                warn!(site = %site, error = %error, "Indexer failed")
            }
            AcquisitionEvent::DownloadStarted {
                origin,
                title,
                site,
                partial,
                ..
            } => info!(
                origin = origin.as_str(),
                title = %title,
                site = %site,
                partial = partial,
                "Download started"
            ),
            AcquisitionEvent::DownloadFailed { title, reason } => {
                warn!(title = %title, reason = %reason, "Download failed")
            }
            AcquisitionEvent::SubscriptionFinished {
                subscription_id,
                name,
            } => info!(subscription_id = subscription_id, name = %name, "Subscription finished"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingEventSink;

    #[test]
    fn test_tally_total() {
        let tally = ClassifyTally {
            accepted: 2,
            rule_fail: 1,
            no_match: 3,
            error: 0,
        };
        assert_eq!(tally.total(), 6);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = AcquisitionEvent::IndexerFailed {
            site: "alpha".to_string(),
            error: "timeout".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "indexer_failed");
        assert_eq!(json["site"], "alpha");
    }

    #[test]
    fn test_sinks_accept_events_outside_a_runtime() {
        let recording = RecordingEventSink::new();
        tokio_test::block_on(async {
            let finished = AcquisitionEvent::SubscriptionFinished {
                subscription_id: 7,
                name: "Show".to_string(),
            };
            LogEventSink.emit(finished.clone()).await;
            recording.emit(finished).await;
        });
        assert_eq!(tokio_test::block_on(recording.finished()), vec![7]);
    }
}
