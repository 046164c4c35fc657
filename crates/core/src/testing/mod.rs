//! Mocks and fixtures for exercising the acquisition flow without real
//! indexers, download clients or catalogs.
//!
//! ```rust,ignore
//! use gapfill_core::testing::{fixtures, MockIndexer, MockDownloadBackend};
//!
//! let indexer = MockIndexer::new(&["alpha"]);
//! indexer.add_results("alpha", "Show", vec![fixtures::raw("Show.S01E01.1080p", "alpha")]).await;
//! let backend = MockDownloadBackend::new(DownloaderKind::QBittorrent);
//! ```

mod mock_download_backend;
mod mock_indexer;
mod mock_introspector;
mod mock_resolver;
mod recording_events;

pub use mock_download_backend::MockDownloadBackend;
pub use mock_indexer::{MockIndexer, RecordedQuery};
pub use mock_introspector::MockIntrospector;
pub use mock_resolver::{MockLibrary, MockResolver};
pub use recording_events::RecordingEventSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::classifier::CandidateRelease;
    use crate::media::{EpisodeSet, MediaIdentity, MediaType, Resolution};
    use crate::searcher::RawCandidate;

    static LOCATOR_SEQ: AtomicU64 = AtomicU64::new(1);

    fn next_locator(slug: &str) -> String {
        let n = LOCATOR_SEQ.fetch_add(1, Ordering::Relaxed);
        format!("http://tracker.test/{}/{}.torrent", slug.replace(' ', "."), n)
    }

    /// "Show" (id 100, 2020): season 1 has 10 episodes, season 2 has 8.
    pub fn show() -> MediaIdentity {
        MediaIdentity::tv("100", "Show", Some(2020))
            .with_season(1, 10)
            .with_season(2, 8)
    }

    /// "Film" (id 200, 2019).
    pub fn film() -> MediaIdentity {
        MediaIdentity::movie("200", "Film", Some(2019))
    }

    /// A 1 GiB hit with ten seeders. The locator is derived from site and title.
    pub fn raw(title: &str, site: &str) -> RawCandidate {
        RawCandidate {
            title: title.to_string(),
            site: site.to_string(),
            size_bytes: 1024 * 1024 * 1024,
            seeders: Some(10),
            peers: 2,
            locator: format!("http://{}.test/{}.torrent", site, title.replace(' ', ".")),
            upload_factor: 1.0,
            download_factor: 1.0,
            ..Default::default()
        }
    }

    /// Classified release of `show()` (retitled) covering `episodes` of `season`.
    ///
    /// An empty episode slice makes it a whole-season pack.
    pub fn tv_candidate(title: &str, season: u32, episodes: &[u32]) -> CandidateRelease {
        let mut identity = show();
        identity.title = title.to_string();
        let episodes: EpisodeSet = episodes.iter().copied().collect();
        let raw_title = match (episodes.first(), episodes.last()) {
            (Some(first), Some(last)) if first == last => {
                format!("{}.S{:02}E{:02}.1080p", title, season, first)
            }
            (Some(first), Some(last)) => {
                format!("{}.S{:02}E{:02}-E{:02}.1080p", title, season, first, last)
            }
            _ => format!("{}.S{:02}.1080p", title, season),
        };

        CandidateRelease {
            raw_title,
            description: None,
            title: title.to_string(),
            year: None,
            seasons: EpisodeSet::from([season]),
            episodes,
            media_type: MediaType::Tv,
            resolution: Some(Resolution::Hd1080),
            identity: Some(identity),
            size_bytes: 1024 * 1024 * 1024,
            seeders: 10,
            peers: 2,
            site: "site-a".to_string(),
            site_rank: 1,
            quality_rank: 0,
            upload_factor: 1.0,
            download_factor: 1.0,
            locator: next_locator(title),
            page_url: None,
            best_rank: None,
        }
    }

    /// Classified movie release; identity id 200.
    pub fn movie_candidate(title: &str, year: u32) -> CandidateRelease {
        CandidateRelease {
            raw_title: format!("{}.{}.1080p.BluRay", title, year),
            description: None,
            title: title.to_string(),
            year: Some(year),
            seasons: EpisodeSet::new(),
            episodes: EpisodeSet::new(),
            media_type: MediaType::Movie,
            resolution: Some(Resolution::Hd1080),
            identity: Some(MediaIdentity::movie("200", title, Some(year))),
            size_bytes: 4 * 1024 * 1024 * 1024,
            seeders: 10,
            peers: 2,
            site: "site-a".to_string(),
            site_rank: 1,
            quality_rank: 0,
            upload_factor: 1.0,
            download_factor: 1.0,
            locator: next_locator(title),
            page_url: None,
            best_rank: None,
        }
    }
}
