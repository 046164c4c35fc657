use std::sync::Arc;

use gapfill_core::download::DownloadClient;
use gapfill_core::subscription::SubscriptionStore;
use gapfill_core::{Config, SanitizedConfig, SubscriptionRunner};

/// The wired acquisition pipeline, present only when every backend is configured.
pub struct Acquisition {
    pub runner: Arc<SubscriptionRunner>,
    pub downloads: Arc<DownloadClient>,
}

/// Shared application state
pub struct AppState {
    config: Config,
    store: Arc<dyn SubscriptionStore>,
    acquisition: Option<Acquisition>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SubscriptionStore>,
        acquisition: Option<Acquisition>,
    ) -> Self {
        Self {
            config,
            store,
            acquisition,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn store(&self) -> &dyn SubscriptionStore {
        self.store.as_ref()
    }

    /// `None` when the acquisition backends are not configured.
    pub fn runner(&self) -> Option<&Arc<SubscriptionRunner>> {
        self.acquisition.as_ref().map(|a| &a.runner)
    }

    pub fn downloads(&self) -> Option<&Arc<DownloadClient>> {
        self.acquisition.as_ref().map(|a| &a.downloads)
    }
}
