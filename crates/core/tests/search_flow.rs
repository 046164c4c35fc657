//! `search_one_media` integration tests: keyword choice, site fan-out and the
//! interactive snapshot.

use std::sync::Arc;
use std::time::Duration;

use gapfill_core::classifier::{CandidateClassifier, RuleBook};
use gapfill_core::download::{DownloadClient, DownloaderKind, PollPolicy};
use gapfill_core::searcher::{MediaSearcher, SearchConfig, SearchSnapshotStore, SearchTarget};
use gapfill_core::selection::{SelectionConfig, SelectionEngine};
use gapfill_core::subscription::SqliteSubscriptionStore;
use gapfill_core::testing::{
    fixtures, MockDownloadBackend, MockIndexer, MockIntrospector, MockResolver,
    RecordingEventSink,
};
use gapfill_core::{CoverageRequest, MediaIdentity, SearchOrigin, SeasonNeed};

struct TestHarness {
    indexer: Arc<MockIndexer>,
    backend: Arc<MockDownloadBackend>,
    events: Arc<RecordingEventSink>,
    snapshots: Arc<SqliteSubscriptionStore>,
    searcher: MediaSearcher,
}

impl TestHarness {
    async fn new(config: SearchConfig, identities: &[MediaIdentity]) -> Self {
        let indexer = Arc::new(MockIndexer::new(&["alpha", "beta"]));
        let resolver = Arc::new(MockResolver::new());
        for identity in identities {
            resolver.add(identity.clone()).await;
        }
        let backend = Arc::new(MockDownloadBackend::new(DownloaderKind::Transmission));
        let events = Arc::new(RecordingEventSink::new());
        let snapshots = Arc::new(SqliteSubscriptionStore::in_memory().expect("in-memory store"));

        let client = Arc::new(DownloadClient::new(
            backend.clone(),
            PollPolicy::new(3, Duration::from_millis(1)),
        ));
        let engine = Arc::new(SelectionEngine::new(
            SelectionConfig::default(),
            client,
            Arc::new(MockIntrospector::new()),
            events.clone(),
        ));
        let classifier = Arc::new(CandidateClassifier::new(
            Arc::new(RuleBook::empty()),
            resolver,
        ));
        let searcher = MediaSearcher::new(
            config,
            indexer.clone(),
            classifier,
            engine,
            snapshots.clone(),
            events.clone(),
        );

        Self {
            indexer,
            backend,
            events,
            snapshots,
            searcher,
        }
    }

    async fn keywords(&self) -> Vec<String> {
        let mut keywords: Vec<String> = self
            .indexer
            .searches()
            .await
            .into_iter()
            .map(|q| q.keyword)
            .collect();
        keywords.dedup();
        keywords
    }
}

fn foreign_titled_show() -> MediaIdentity {
    let mut show = fixtures::show();
    show.original_title = Some("Serie".to_string());
    show
}

#[tokio::test]
async fn test_secondary_keyword_only_when_primary_empty() {
    let show = foreign_titled_show();
    let h = TestHarness::new(SearchConfig::default(), &[show.clone()]).await;
    h.indexer
        .add_results("alpha", "Serie", vec![fixtures::raw("Serie.S01E04.720p", "alpha")])
        .await;

    let coverage = CoverageRequest::for_season(&show, SeasonNeed::new(1, [4], 10));
    let outcome = h
        .searcher
        .search_one_media(
            &SearchTarget::new(show.clone()).with_season(1),
            SearchOrigin::Web,
            coverage,
            None,
            None,
        )
        .await;

    assert_eq!(h.keywords().await, vec!["Show".to_string(), "Serie".to_string()]);
    assert_eq!(outcome.candidate_count, 1);
    assert_eq!(outcome.downloaded_count, Some(1));
    assert!(outcome.satisfied);
    assert!(outcome.residual.is_empty());
}

#[tokio::test]
async fn test_primary_hits_skip_secondary() {
    let show = foreign_titled_show();
    let h = TestHarness::new(SearchConfig::default(), &[show.clone()]).await;
    h.indexer
        .add_results("alpha", "Show", vec![fixtures::raw("Show.S03E01.720p", "alpha")])
        .await;

    let outcome = h
        .searcher
        .search_one_media(
            &SearchTarget::new(show).with_season(1),
            SearchOrigin::Web,
            CoverageRequest::new(),
            None,
            None,
        )
        .await;

    // The hit is for another season, but it still counts as a raw result
    assert_eq!(h.keywords().await, vec!["Show".to_string()]);
    assert_eq!(outcome.candidate_count, 0);
    assert_eq!(outcome.downloaded_count, Some(0));
    assert!(!outcome.satisfied);
}

#[tokio::test]
async fn test_foreign_title_preferred() {
    let show = foreign_titled_show();
    let config = SearchConfig {
        prefer_foreign_title: true,
        ..Default::default()
    };
    let h = TestHarness::new(config, &[show.clone()]).await;

    h.searcher
        .search_one_media(
            &SearchTarget::new(show).with_season(1),
            SearchOrigin::Web,
            CoverageRequest::new(),
            None,
            None,
        )
        .await;

    assert_eq!(h.keywords().await, vec!["Serie".to_string(), "Show".to_string()]);
}

#[tokio::test]
async fn test_interactive_search_stores_snapshot_without_downloading() {
    let film = fixtures::film();
    let config = SearchConfig {
        auto_download_interactive: false,
        ..Default::default()
    };
    let h = TestHarness::new(config, &[film.clone()]).await;
    h.indexer
        .add_results(
            "alpha",
            "Film",
            vec![
                fixtures::raw("Film.2019.720p.WEB-DL", "alpha"),
                fixtures::raw("Film.2019.1080p.BluRay", "alpha"),
            ],
        )
        .await;

    let outcome = h
        .searcher
        .search_one_media(
            &SearchTarget::new(film),
            SearchOrigin::Chat,
            CoverageRequest::new(),
            None,
            None,
        )
        .await;

    assert_eq!(outcome.candidate_count, 2);
    assert!(outcome.downloaded_count.is_none());
    assert!(h.backend.added().await.is_empty());
    assert_eq!(h.snapshots.last_search().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failing_site_does_not_hide_others() {
    let film = fixtures::film();
    let h = TestHarness::new(SearchConfig::default(), &[film.clone()]).await;
    h.indexer.fail_site("beta").await;
    h.indexer
        .add_results("alpha", "Film", vec![fixtures::raw("Film.2019.1080p.BluRay", "alpha")])
        .await;

    let outcome = h
        .searcher
        .search_one_media(
            &SearchTarget::new(film),
            SearchOrigin::Web,
            CoverageRequest::new(),
            None,
            None,
        )
        .await;

    assert_eq!(outcome.downloaded_count, Some(1));
    assert!(outcome.satisfied);
    assert_eq!(h.events.indexer_failures().await, 1);
}

#[tokio::test]
async fn test_site_allow_list() {
    let film = fixtures::film();
    let h = TestHarness::new(SearchConfig::default(), &[film.clone()]).await;

    h.searcher
        .search_one_media(
            &SearchTarget::new(film),
            SearchOrigin::Web,
            CoverageRequest::new(),
            Some(vec!["beta".to_string()]),
            None,
        )
        .await;

    let sites: Vec<String> = h
        .indexer
        .searches()
        .await
        .into_iter()
        .map(|q| q.site)
        .collect();
    assert_eq!(sites, vec!["beta".to_string()]);
}

#[tokio::test]
async fn test_wrong_year_is_filtered_for_movies() {
    let film = fixtures::film();
    let h = TestHarness::new(SearchConfig::default(), &[film.clone()]).await;
    h.indexer
        .add_results("alpha", "Film", vec![fixtures::raw("Film.1987.1080p.BluRay", "alpha")])
        .await;

    let outcome = h
        .searcher
        .search_one_media(
            &SearchTarget::new(film),
            SearchOrigin::Web,
            CoverageRequest::new(),
            None,
            None,
        )
        .await;

    assert_eq!(outcome.candidate_count, 0);
    assert!(h.backend.added().await.is_empty());
}
