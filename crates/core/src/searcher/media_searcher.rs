//! One search attempt for one wanted media.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{
    requested_seasons, CandidateClassifier, CandidateRelease, FilterArgs,
};
use crate::coverage::CoverageRequest;
use crate::events::{AcquisitionEvent, EventSink};
use crate::media::{EpisodeSet, MediaIdentity, MediaType, SearchOrigin};
use crate::metrics;
use crate::selection::{sort_candidates, DownloadOrder, SelectionEngine};
use crate::subscription::StoreError;

use super::{Indexer, IndexerSite, SearchConfig};

/// Persists the ranked candidate list of the latest interactive search.
pub trait SearchSnapshotStore: Send + Sync {
    /// Replace the previous snapshot with `candidates`.
    fn replace_last_search(&self, candidates: &[CandidateRelease]) -> Result<(), StoreError>;

    fn last_search(&self) -> Result<Vec<CandidateRelease>, StoreError>;
}

/// What to search for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    pub identity: MediaIdentity,
    #[serde(default)]
    pub seasons: EpisodeSet,
    #[serde(default)]
    pub episodes: EpisodeSet,
}

impl SearchTarget {
    pub fn new(identity: MediaIdentity) -> Self {
        Self {
            identity,
            seasons: EpisodeSet::new(),
            episodes: EpisodeSet::new(),
        }
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.seasons.insert(season);
        self
    }

    pub fn with_episodes(mut self, episodes: impl IntoIterator<Item = u32>) -> Self {
        self.episodes.extend(episodes);
        self
    }
}

/// Result of `search_one_media`.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Downloaded candidates; empty when nothing was downloaded.
    pub selected: Vec<CandidateRelease>,
    pub residual: CoverageRequest,
    /// Accepted candidates across all sites.
    pub candidate_count: usize,
    /// `None` when downloading was skipped for an interactive search.
    pub downloaded_count: Option<usize>,
    /// Something was downloaded and the target has nothing left missing.
    pub satisfied: bool,
}

pub struct MediaSearcher {
    config: SearchConfig,
    indexer: Arc<dyn Indexer>,
    classifier: Arc<CandidateClassifier>,
    engine: Arc<SelectionEngine>,
    snapshots: Arc<dyn SearchSnapshotStore>,
    events: Arc<dyn EventSink>,
    download_order: DownloadOrder,
}

impl MediaSearcher {
    pub fn new(
        config: SearchConfig,
        indexer: Arc<dyn Indexer>,
        classifier: Arc<CandidateClassifier>,
        engine: Arc<SelectionEngine>,
        snapshots: Arc<dyn SearchSnapshotStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            indexer,
            classifier,
            engine,
            snapshots,
            events,
            download_order: DownloadOrder::default(),
        }
    }

    /// Order used when ranking the interactive snapshot.
    pub fn with_download_order(mut self, order: DownloadOrder) -> Self {
        self.download_order = order;
        self
    }

    pub fn classifier(&self) -> &CandidateClassifier {
        &self.classifier
    }

    /// Search every allowed site for `target` and download what `coverage` needs.
    pub async fn search_one_media(
        &self,
        target: &SearchTarget,
        origin: SearchOrigin,
        coverage: CoverageRequest,
        sites: Option<Vec<String>>,
        filters: Option<&FilterArgs>,
    ) -> SearchOutcome {
        let args = self.filter_args(target, sites, filters);
        let (primary, secondary) = self.keywords(&target.identity);

        let (mut candidates, raw_count) = self.search_keyword(&primary, target, &args).await;
        if raw_count == 0 {
            if let Some(secondary) = secondary {
                debug!(primary = %primary, secondary = %secondary, "No hits, retrying with secondary keyword");
                candidates = self.search_keyword(&secondary, target, &args).await.0;
            }
        }

        let candidate_count = candidates.len();
        if candidates.is_empty() {
            info!(title = %target.identity.title, origin = origin.as_str(), "No candidates found");
            metrics::SEARCHES
                .with_label_values(&[origin.as_str(), "empty"])
                .inc();
            return SearchOutcome {
                residual: coverage,
                downloaded_count: Some(0),
                ..Default::default()
            };
        }

        if origin.is_interactive() {
            let mut ranked = candidates.clone();
            sort_candidates(&mut ranked, self.download_order);
            if let Err(e) = self.snapshots.replace_last_search(&ranked) {
                warn!(error = %e, "Failed to store search snapshot");
            }

            if !self.config.auto_download_interactive {
                metrics::SEARCHES
                    .with_label_values(&[origin.as_str(), "no_download"])
                    .inc();
                return SearchOutcome {
                    residual: coverage,
                    candidate_count,
                    downloaded_count: None,
                    ..Default::default()
                };
            }
        }

        let result = self.engine.select(candidates, coverage, origin).await;
        let satisfied =
            !result.selected.is_empty() && !result.residual.contains(&target.identity.key());

        metrics::SEARCHES
            .with_label_values(&[origin.as_str(), if satisfied { "satisfied" } else { "partial" }])
            .inc();
        info!(
            title = %target.identity.title,
            origin = origin.as_str(),
            candidates = candidate_count,
            downloaded = result.selected.len(),
            satisfied = satisfied,
            "Search finished"
        );

        SearchOutcome {
            downloaded_count: Some(result.selected.len()),
            selected: result.selected,
            residual: result.residual,
            candidate_count,
            satisfied,
        }
    }

    /// Filters derived from the target, with the caller's overrides on top.
    fn filter_args(
        &self,
        target: &SearchTarget,
        sites: Option<Vec<String>>,
        filters: Option<&FilterArgs>,
    ) -> FilterArgs {
        let identity = &target.identity;
        let derived = FilterArgs {
            seasons: match identity.media_type {
                MediaType::Tv => requested_seasons(&target.seasons, &target.episodes),
                MediaType::Movie => EpisodeSet::new(),
            },
            episodes: target.episodes.clone(),
            year: match identity.media_type {
                MediaType::Movie => identity.year,
                MediaType::Tv => None,
            },
            media_type: Some(identity.media_type),
            sites,
            require_seeders: true,
            ..Default::default()
        };
        match filters {
            Some(overrides) => derived.merge(overrides),
            None => derived,
        }
    }

    /// Primary and (distinct) secondary search keyword.
    fn keywords(&self, identity: &MediaIdentity) -> (String, Option<String>) {
        let localized = identity.title.clone();
        let foreign = identity
            .original_title
            .clone()
            .filter(|t| !t.trim().is_empty());

        let (primary, secondary) = match foreign {
            Some(foreign) if self.config.prefer_foreign_title => (foreign, Some(localized)),
            Some(foreign) => (localized, Some(foreign)),
            None => (localized, None),
        };
        let secondary = secondary.filter(|s| !s.eq_ignore_ascii_case(&primary));
        (primary, secondary)
    }

    fn sites_for(&self, args: &FilterArgs) -> Vec<IndexerSite> {
        self.indexer
            .sites()
            .into_iter()
            .filter(|s| match &args.sites {
                Some(allowed) => allowed.iter().any(|a| a == &s.name),
                None => true,
            })
            .collect()
    }

    /// Fan out one keyword to every allowed site and classify the hits.
    ///
    /// Returns accepted candidates and the raw hit count.
    async fn search_keyword(
        &self,
        keyword: &str,
        target: &SearchTarget,
        args: &FilterArgs,
    ) -> (Vec<CandidateRelease>, usize) {
        let sites = self.sites_for(args);
        if sites.is_empty() {
            warn!(keyword = keyword, "No indexer sites to search");
            return (Vec::new(), 0);
        }

        let indexer = self.indexer.as_ref();
        let batches: Vec<_> = stream::iter(sites)
            .map(|site| async move {
                let result = indexer.search(&site, keyword, args).await;
                (site, result)
            })
            .buffer_unordered(self.config.max_parallel_sites.max(1))
            .collect()
            .await;

        let mut accepted = Vec::new();
        let mut raw_count = 0;
        for (site, result) in batches {
            let raws = match result {
                Ok(raws) => {
                    metrics::SITE_QUERIES
                        .with_label_values(&[site.name.as_str(), "ok"])
                        .inc();
                    raws
                }
                Err(e) => {
                    metrics::SITE_QUERIES
                        .with_label_values(&[site.name.as_str(), "error"])
                        .inc();
                    warn!(site = %site.name, keyword = keyword, error = %e, "Site search failed");
                    self.events
                        .emit(AcquisitionEvent::IndexerFailed {
                            site: site.name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    continue;
                }
            };

            raw_count += raws.len();
            let (mut batch, tally) = self
                .classifier
                .classify_batch(raws, &site, Some(&target.identity), args)
                .await;
            self.events
                .emit(AcquisitionEvent::SearchProgress {
                    site: site.name.clone(),
                    keyword: keyword.to_string(),
                    tally,
                })
                .await;
            accepted.append(&mut batch);
        }

        metrics::SEARCH_HITS.observe(raw_count as f64);
        (accepted, raw_count)
    }
}
