//! Standing subscriptions: persistence and the periodic search cycle.

mod config;
pub mod legacy;
mod runner;
mod sqlite_store;
mod store;
mod types;

pub use config::SubscriptionConfig;
pub use legacy::{format_legacy_description, parse_legacy_description, LegacyDescription};
pub use runner::{ScanOutcome, ScanReport, SubscriptionError, SubscriptionRunner};
pub use sqlite_store::SqliteSubscriptionStore;
pub use store::{StoreError, SubscriptionStore};
pub use types::*;
