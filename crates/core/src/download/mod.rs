//! Download backend abstraction.
//!
//! A `DownloadBackend` wraps one concrete client (qBittorrent, ...). The
//! `DownloadClient` handle serializes work against it and implements the
//! paused-download, file-selection, resume sequence used for partial packs.

mod client;
mod introspector;
mod partial;
mod poll;
mod qbittorrent;
mod types;

pub use client::{DownloadClient, PartialOutcome};
pub use introspector::{
    episodes_in_files, torrent_file_paths, HttpTorrentIntrospector, IntrospectError,
    TorrentIntrospector,
};
pub use partial::{select_files, PartialSelection};
pub use poll::PollPolicy;
pub use qbittorrent::QBittorrentBackend;
pub use types::*;
