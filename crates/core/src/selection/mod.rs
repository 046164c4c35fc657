//! Download selection engine.
//!
//! Turns a classified candidate list plus a coverage request into download
//! commands, returning what was downloaded and what is still missing.

mod config;
mod engine;
mod ranking;

pub use config::{DownloadOrder, SelectionConfig};
pub use engine::{SelectionEngine, SelectionResult};
pub use ranking::{dedup_candidates, sort_candidates};
