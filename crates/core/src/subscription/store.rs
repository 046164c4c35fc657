//! Subscription persistence trait.

use thiserror::Error;

use crate::media::{EpisodeSet, MediaType};

use super::{HistoryEntry, NewSubscription, Subscription, SubscriptionState};

/// Errors from subscription storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Subscription not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Persistence for subscriptions and their history.
pub trait SubscriptionStore: Send + Sync {
    fn create(&self, request: &NewSubscription) -> Result<Subscription, StoreError>;

    fn get(&self, id: i64) -> Result<Option<Subscription>, StoreError>;

    /// Subscriptions in `state`, oldest first, optionally of one media type.
    fn list_by_state(
        &self,
        state: SubscriptionState,
        media_type: Option<MediaType>,
    ) -> Result<Vec<Subscription>, StoreError>;

    fn update_state(&self, id: i64, state: SubscriptionState) -> Result<(), StoreError>;

    /// Persist the residual missing episodes (`None` resets to "never computed").
    fn update_missing(
        &self,
        id: i64,
        missing: Option<&EpisodeSet>,
        total_episodes: Option<u32>,
    ) -> Result<(), StoreError>;

    fn update_best_rank(&self, id: i64, rank: u32) -> Result<(), StoreError>;

    /// Move a satisfied subscription to history, removing the active record.
    fn archive(&self, id: i64, satisfied: Option<&EpisodeSet>) -> Result<HistoryEntry, StoreError>;

    fn history(&self) -> Result<Vec<HistoryEntry>, StoreError>;

    fn delete(&self, id: i64) -> Result<(), StoreError>;
}
