//! Selection engine scenarios.
//!
//! Each test feeds ranked candidates and a coverage request to the engine and
//! checks which downloads were issued and what is left missing.

use std::sync::Arc;
use std::time::Duration;

use gapfill_core::download::{
    DownloadClient, DownloaderKind, FilePriority, FileSelection, PollPolicy,
};
use gapfill_core::selection::{SelectionConfig, SelectionEngine};
use gapfill_core::testing::{fixtures, MockDownloadBackend, MockIntrospector, RecordingEventSink};
use gapfill_core::download::DownloadError;
use gapfill_core::{CoverageRequest, EpisodeSet, MediaIdentity, SearchOrigin, SeasonNeed};

struct TestHarness {
    backend: Arc<MockDownloadBackend>,
    introspector: Arc<MockIntrospector>,
    events: Arc<RecordingEventSink>,
    engine: SelectionEngine,
}

impl TestHarness {
    fn new() -> Self {
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::QBittorrent));
        let introspector = Arc::new(MockIntrospector::new());
        let events = Arc::new(RecordingEventSink::new());
        let client = Arc::new(DownloadClient::new(
            backend.clone(),
            PollPolicy::new(3, Duration::from_millis(1)),
        ));
        let engine = SelectionEngine::new(
            SelectionConfig::default(),
            client,
            introspector.clone(),
            events.clone(),
        );
        Self {
            backend,
            introspector,
            events,
            engine,
        }
    }
}

fn episode_files(season: u32, episodes: impl IntoIterator<Item = u32>) -> Vec<String> {
    episodes
        .into_iter()
        .map(|e| format!("Show.S{:02}E{:02}.1080p.mkv", season, e))
        .collect()
}

fn as_refs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

fn whole_season_one() -> CoverageRequest {
    CoverageRequest::for_season(&fixtures::show(), SeasonNeed::whole(1, 10))
}

#[tokio::test]
async fn test_movie_is_downloaded_once() {
    let h = TestHarness::new();
    let mut worse = fixtures::movie_candidate("Film", 2019);
    worse.quality_rank = 50;
    let mut better = fixtures::movie_candidate("Film", 2019);
    better.quality_rank = 10;

    let result = h
        .engine
        .select(
            vec![worse, better.clone()],
            CoverageRequest::new(),
            SearchOrigin::Web,
        )
        .await;

    assert_eq!(result.selected.len(), 1);
    let added = h.backend.added().await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].locator, better.locator);
    assert!(!added[0].paused);
}

#[tokio::test]
async fn test_movie_without_year_in_name_is_same_movie() {
    let h = TestHarness::new();
    let dated = fixtures::movie_candidate("Film", 2019);
    let mut bare = fixtures::movie_candidate("Film", 2019);
    bare.raw_title = "Film.1080p.WEB-DL".to_string();
    bare.year = None;

    let result = h
        .engine
        .select(vec![dated, bare], CoverageRequest::new(), SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    assert_eq!(h.backend.added().await.len(), 1);
}

#[tokio::test]
async fn test_complete_season_pack_accepted() {
    let h = TestHarness::new();
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    let all: Vec<u32> = (1..=10).collect();
    h.introspector.set_episodes(&pack.locator, &all).await;

    let result = h
        .engine
        .select(vec![pack.clone()], whole_season_one(), SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    assert!(result.residual.is_empty());
    assert_eq!(h.events.downloads_started().await, vec![(pack.raw_title, false)]);
}

#[tokio::test]
async fn test_incomplete_season_pack_falls_through_to_file_selection() {
    let h = TestHarness::new();
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    h.introspector
        .set_episodes(&pack.locator, &[1, 2, 3, 4, 5, 6])
        .await;
    let files = episode_files(1, 1..=6);
    h.backend.set_files_for(&pack.locator, &as_refs(&files)).await;

    let result = h
        .engine
        .select(vec![pack.clone()], whole_season_one(), SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    let remaining = result
        .residual
        .season("tv:100", 1)
        .map(|s| s.needed_episodes())
        .unwrap();
    assert_eq!(remaining, EpisodeSet::from([7, 8, 9, 10]));

    let started = h.events.downloads_started().await;
    assert_eq!(started, vec![(pack.raw_title, true)]);
    let added = h.backend.added().await;
    assert!(added[0].paused);
}

#[tokio::test]
async fn test_incomplete_pack_skipped_without_file_selection() {
    let h = TestHarness::new();
    h.backend.set_supports_file_selection(false);
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    h.introspector.set_episodes(&pack.locator, &[1, 2, 3]).await;

    let result = h
        .engine
        .select(vec![pack], whole_season_one(), SearchOrigin::Subscription)
        .await;

    assert!(result.selected.is_empty());
    assert!(h.backend.added().await.is_empty());
    assert_eq!(result.residual.whole_seasons("tv:100"), EpisodeSet::from([1]));
}

#[tokio::test]
async fn test_superset_pack_keeps_only_needed_files() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, [3, 4, 5], 10));

    let single = fixtures::tv_candidate("Show", 1, &[3]);
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    let files = episode_files(1, 1..=10);
    h.backend.set_files_for(&pack.locator, &as_refs(&files)).await;

    let result = h
        .engine
        .select(vec![pack, single], coverage, SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 2);
    assert!(result.residual.is_empty());

    // The single episode is taken first, the pack only for 4 and 5
    let selection = h.backend.selection_for("task-2").await.unwrap();
    let FileSelection::Priorities(entries) = selection else {
        panic!("qBittorrent uses priorities");
    };
    assert_eq!(entries.len(), 10);
    let kept: Vec<usize> = entries
        .iter()
        .filter(|(_, p)| *p == FilePriority::Normal)
        .map(|(i, _)| *i)
        .collect();
    assert_eq!(kept, vec![3, 4]);
}

#[tokio::test]
async fn test_episode_subset_discipline() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(2, [1, 2], 8));

    let candidates = vec![
        // Wrong season
        fixtures::tv_candidate("Show", 1, &[1]),
        // Not a subset of what is missing
        fixtures::tv_candidate("Show", 2, &[2, 3]),
        fixtures::tv_candidate("Show", 2, &[1]),
    ];
    let result = h
        .engine
        .select(candidates, coverage, SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    assert_eq!(result.selected[0].episodes, EpisodeSet::from([1]));
    assert_eq!(
        result.residual.season("tv:100", 2).unwrap().needed_episodes(),
        EpisodeSet::from([2])
    );
}

#[tokio::test]
async fn test_empty_coverage_is_idempotent() {
    let h = TestHarness::new();
    let candidates = vec![
        fixtures::tv_candidate("Show", 1, &[1]),
        fixtures::tv_candidate("Show", 1, &[]),
    ];

    for _ in 0..2 {
        let result = h
            .engine
            .select(candidates.clone(), CoverageRequest::new(), SearchOrigin::Subscription)
            .await;
        assert!(result.selected.is_empty());
        assert!(result.residual.is_empty());
    }
    assert!(h.backend.added().await.is_empty());
}

#[tokio::test]
async fn test_pack_for_partial_need_goes_through_file_selection() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, 3..=10, 10));
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    let all: Vec<u32> = (1..=10).collect();
    h.introspector.set_episodes(&pack.locator, &all).await;
    let files = episode_files(1, 1..=10);
    h.backend.set_files_for(&pack.locator, &as_refs(&files)).await;

    let result = h
        .engine
        .select(vec![pack.clone()], coverage, SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    assert!(result.residual.is_empty());
    assert_eq!(h.events.downloads_started().await, vec![(pack.raw_title, true)]);

    let selection = h.backend.selection_for("task-1").await.unwrap();
    let FileSelection::Priorities(entries) = selection else {
        panic!("qBittorrent uses priorities");
    };
    let kept: Vec<usize> = entries
        .iter()
        .filter(|(_, p)| *p == FilePriority::Normal)
        .map(|(i, _)| *i)
        .collect();
    assert_eq!(kept, (2..10).collect::<Vec<usize>>());
}

#[tokio::test]
async fn test_pack_for_partial_need_skipped_without_file_selection() {
    let h = TestHarness::new();
    h.backend.set_supports_file_selection(false);
    let show = fixtures::show();
    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, 3..=10, 10));
    let pack = fixtures::tv_candidate("Show", 1, &[]);
    let all: Vec<u32> = (1..=10).collect();
    h.introspector.set_episodes(&pack.locator, &all).await;

    let result = h
        .engine
        .select(vec![pack], coverage, SearchOrigin::Subscription)
        .await;

    assert!(result.selected.is_empty());
    assert!(h.backend.added().await.is_empty());
    assert_eq!(
        result.residual.season("tv:100", 1).unwrap().needed_episodes(),
        (3..=10).collect::<EpisodeSet>()
    );
}

#[tokio::test]
async fn test_multi_season_pack_skips_introspection() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let mut coverage = CoverageRequest::for_season(&show, SeasonNeed::whole(1, 10));
    coverage.insert(&show, SeasonNeed::whole(2, 8));

    let mut pack = fixtures::tv_candidate("Show", 1, &[]);
    pack.seasons = EpisodeSet::from([1, 2]);
    // Would fail verification if it were checked
    h.introspector.set_episodes(&pack.locator, &[1]).await;

    let result = h
        .engine
        .select(vec![pack.clone()], coverage, SearchOrigin::Subscription)
        .await;

    assert_eq!(result.selected.len(), 1);
    assert!(result.residual.is_empty());
    assert_eq!(h.events.downloads_started().await, vec![(pack.raw_title, false)]);
}

#[tokio::test]
async fn test_failed_episode_pack_not_retried_as_superset() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, [3, 4], 10));
    let exact = fixtures::tv_candidate("Show", 1, &[3, 4]);
    let files = episode_files(1, [3, 4]);
    h.backend.set_files_for(&exact.locator, &as_refs(&files)).await;
    h.backend
        .set_next_error(DownloadError::Rejected("tracker down".to_string()))
        .await;

    let result = h
        .engine
        .select(vec![exact], coverage, SearchOrigin::Subscription)
        .await;

    assert!(result.selected.is_empty());
    assert!(h.backend.added().await.is_empty());
    assert_eq!(h.events.download_failures().await, 1);
    assert_eq!(
        result.residual.season("tv:100", 1).unwrap().needed_episodes(),
        EpisodeSet::from([3, 4])
    );
}

#[tokio::test]
async fn test_needs_shrink_across_passes_for_each_identity() {
    let h = TestHarness::new();
    let show = fixtures::show();
    let other = MediaIdentity::tv("300", "Other", Some(2021)).with_season(1, 4);
    let mut coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, [1, 2, 3], 10));
    coverage.insert(&other, SeasonNeed::whole(1, 4));

    let other_candidate = |episodes: &[u32]| {
        let mut c = fixtures::tv_candidate("Other", 1, episodes);
        c.identity = Some(other.clone());
        c
    };
    let other_pack = other_candidate(&[]);
    let other_single = other_candidate(&[2]);
    h.introspector
        .set_episodes(&other_pack.locator, &[1, 2, 3, 4])
        .await;

    let show_single = fixtures::tv_candidate("Show", 1, &[1]);
    let show_pack = fixtures::tv_candidate("Show", 1, &[]);
    let files = episode_files(1, 1..=10);
    h.backend.set_files_for(&show_pack.locator, &as_refs(&files)).await;

    let result = h
        .engine
        .select(
            vec![show_pack, other_single.clone(), show_single, other_pack],
            coverage,
            SearchOrigin::Subscription,
        )
        .await;

    assert!(result.residual.is_empty());
    let added = h.backend.added().await;
    assert_eq!(added.len(), 3);
    assert!(added.iter().all(|r| r.locator != other_single.locator));

    // Pass 2 takes the other show, pass 3 episode 1, pass 4 the rest
    let selection = h.backend.selection_for("task-3").await.unwrap();
    let FileSelection::Priorities(entries) = selection else {
        panic!("qBittorrent uses priorities");
    };
    let kept: Vec<usize> = entries
        .iter()
        .filter(|(_, p)| *p == FilePriority::Normal)
        .map(|(i, _)| *i)
        .collect();
    assert_eq!(kept, vec![1, 2]);
}
