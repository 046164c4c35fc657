use serde::{Deserialize, Serialize};

/// Subscription scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Run the periodic scan.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between two scans of retained subscriptions.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Scan new subscriptions once right after start-up.
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    3600
}

fn default_run_on_start() -> bool {
    true
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            scan_interval_secs: default_scan_interval_secs(),
            run_on_start: default_run_on_start(),
        }
    }
}
