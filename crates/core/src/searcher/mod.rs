//! Indexer search.
//!
//! An `Indexer` backend (Jackett, ...) answers keyword queries per site. The
//! `MediaSearcher` drives one search attempt for a wanted media: keyword
//! variants, bounded fan-out across sites, classification, and hand-off to
//! the selection engine.

mod config;
mod jackett;
mod media_searcher;
mod types;

pub use config::SearchConfig;
pub use jackett::JackettIndexer;
pub use media_searcher::{MediaSearcher, SearchOutcome, SearchSnapshotStore, SearchTarget};
pub use types::*;
