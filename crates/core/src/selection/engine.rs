//! Multi-pass download selection.
//!
//! Candidates are ranked and deduplicated, then consumed in fixed passes:
//! movies, whole seasons, single-season episode packs, and finally oversized
//! season packs with per-file selection. Every pass only shrinks the coverage
//! request and a candidate is downloaded at most once per invocation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classifier::CandidateRelease;
use crate::coverage::CoverageRequest;
use crate::download::{DownloadClient, DownloadRequest, PartialOutcome, TorrentIntrospector};
use crate::events::{AcquisitionEvent, EventSink};
use crate::media::{EpisodeSet, MediaType, SearchOrigin};
use crate::metrics;

use super::ranking::{dedup_candidates, sort_candidates};
use super::SelectionConfig;

/// What the engine downloaded and what is still missing.
#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    /// Downloaded candidates, in download order.
    pub selected: Vec<CandidateRelease>,
    pub residual: CoverageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Movie,
    WholeSeason,
    Episodes,
    Superset,
}

impl Pass {
    fn as_str(&self) -> &'static str {
        match self {
            Pass::Movie => "movie",
            Pass::WholeSeason => "whole_season",
            Pass::Episodes => "episodes",
            Pass::Superset => "superset",
        }
    }
}

/// Ranked candidates plus a "used" flag each.
struct Pool {
    candidates: Vec<CandidateRelease>,
    taken: Vec<bool>,
}

impl Pool {
    fn new(candidates: Vec<CandidateRelease>) -> Self {
        let taken = vec![false; candidates.len()];
        Self { candidates, taken }
    }

    /// Indexes of unused TV candidates for one identity, in rank order.
    fn open_for(&self, key: &str) -> Vec<usize> {
        (0..self.candidates.len())
            .filter(|i| !self.taken[*i])
            .filter(|i| {
                let c = &self.candidates[*i];
                c.media_type == MediaType::Tv && c.identity_key().as_deref() == Some(key)
            })
            .collect()
    }
}

pub struct SelectionEngine {
    config: SelectionConfig,
    client: Arc<DownloadClient>,
    introspector: Arc<dyn TorrentIntrospector>,
    events: Arc<dyn EventSink>,
}

impl SelectionEngine {
    pub fn new(
        config: SelectionConfig,
        client: Arc<DownloadClient>,
        introspector: Arc<dyn TorrentIntrospector>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            client,
            introspector,
            events,
        }
    }

    /// Download what is needed from `candidates`, shrinking `coverage`.
    pub async fn select(
        &self,
        mut candidates: Vec<CandidateRelease>,
        mut coverage: CoverageRequest,
        origin: SearchOrigin,
    ) -> SelectionResult {
        sort_candidates(&mut candidates, self.config.download_order);
        let mut pool = Pool::new(dedup_candidates(candidates));
        let mut selected = Vec::new();

        for i in 0..pool.candidates.len() {
            if pool.candidates[i].is_movie() {
                pool.taken[i] = true;
                if self.download(&pool.candidates[i], Pass::Movie, origin).await {
                    selected.push(pool.candidates[i].clone());
                }
            }
        }

        if !coverage.is_empty() {
            self.whole_season_pass(&mut pool, &mut coverage, &mut selected, origin)
                .await;
        }
        if !coverage.is_empty() {
            self.episode_pass(&mut pool, &mut coverage, &mut selected, origin)
                .await;
        }
        if !coverage.is_empty() && self.client.supports_file_selection() {
            self.superset_pass(&mut pool, &mut coverage, &mut selected, origin)
                .await;
        }

        debug!(
            downloaded = selected.len(),
            residual_identities = coverage.keys().len(),
            "Selection finished"
        );
        SelectionResult {
            selected,
            residual: coverage,
        }
    }

    async fn whole_season_pass(
        &self,
        pool: &mut Pool,
        coverage: &mut CoverageRequest,
        selected: &mut Vec<CandidateRelease>,
        origin: SearchOrigin,
    ) {
        for key in coverage.keys() {
            for i in pool.open_for(&key) {
                let wanted = coverage.whole_seasons(&key);
                if wanted.is_empty() {
                    break;
                }
                let candidate = &pool.candidates[i];
                if !candidate.episodes.is_empty()
                    || candidate.seasons.is_empty()
                    || !candidate.seasons.is_subset(&wanted)
                {
                    continue;
                }

                if let Some(season) = candidate.single_season() {
                    let total = coverage
                        .season(&key, season)
                        .map(|s| s.total_episodes)
                        .unwrap_or(0);
                    if !self.verify_season_pack(candidate, season, total).await {
                        continue;
                    }
                }

                pool.taken[i] = true;
                if self.download(candidate, Pass::WholeSeason, origin).await {
                    coverage.remove_seasons(&key, &candidate.seasons);
                    selected.push(candidate.clone());
                }
            }
        }
    }

    /// A single-season pack must carry at least `total` episode files.
    ///
    /// An unreachable payload cannot be verified and is accepted.
    async fn verify_season_pack(&self, candidate: &CandidateRelease, season: u32, total: u32) -> bool {
        match self.introspector.episodes(&candidate.locator).await {
            Ok(episodes) if episodes.len() as u32 >= total => true,
            Ok(episodes) => {
                debug!(
                    title = %candidate.raw_title,
                    season = season,
                    found = episodes.len(),
                    total = total,
                    "Season pack is incomplete"
                );
                false
            }
            Err(e) => {
                warn!(
                    title = %candidate.raw_title,
                    season = season,
                    error = %e,
                    "Season pack not verifiable, accepting"
                );
                true
            }
        }
    }

    async fn episode_pass(
        &self,
        pool: &mut Pool,
        coverage: &mut CoverageRequest,
        selected: &mut Vec<CandidateRelease>,
        origin: SearchOrigin,
    ) {
        for key in coverage.keys() {
            let seasons: Vec<u32> = coverage
                .get(&key)
                .map(|n| n.seasons.keys().copied().collect())
                .unwrap_or_default();

            for season in seasons {
                let mut needed = match coverage.season(&key, season) {
                    Some(need) => need.needed_episodes(),
                    None => continue,
                };

                for i in pool.open_for(&key) {
                    if needed.is_empty() {
                        break;
                    }
                    let candidate = &pool.candidates[i];
                    if candidate.single_season() != Some(season)
                        || candidate.episodes.is_empty()
                        || !candidate.episodes.is_subset(&needed)
                    {
                        continue;
                    }

                    pool.taken[i] = true;
                    if self.download(candidate, Pass::Episodes, origin).await {
                        needed = coverage.remove_episodes(&key, season, &candidate.episodes);
                        selected.push(candidate.clone());
                    }
                }
            }
        }
    }

    async fn superset_pass(
        &self,
        pool: &mut Pool,
        coverage: &mut CoverageRequest,
        selected: &mut Vec<CandidateRelease>,
        origin: SearchOrigin,
    ) {
        for key in coverage.keys() {
            let seasons: Vec<u32> = coverage
                .get(&key)
                .map(|n| n.seasons.keys().copied().collect())
                .unwrap_or_default();

            for season in seasons {
                let mut needed = match coverage.season(&key, season) {
                    Some(need) => need.needed_episodes(),
                    None => continue,
                };

                for i in pool.open_for(&key) {
                    if needed.is_empty() {
                        break;
                    }
                    let candidate = &pool.candidates[i];
                    let is_superset = candidate.episodes.is_superset(&needed)
                        && candidate.episodes.len() > needed.len();
                    if candidate.single_season() != Some(season)
                        || !(candidate.episodes.is_empty() || is_superset)
                    {
                        continue;
                    }

                    pool.taken[i] = true;
                    if let Some(matched) = self.download_partial(candidate, &needed, origin).await {
                        needed = coverage.remove_episodes(&key, season, &matched);
                        selected.push(candidate.clone());
                    }
                }
            }
        }
    }

    fn request_for(&self, candidate: &CandidateRelease) -> DownloadRequest {
        let dir = match candidate.media_type {
            MediaType::Movie => self.config.movie_dir.clone(),
            MediaType::Tv => self.config.tv_dir.clone(),
        };
        DownloadRequest::new(candidate.locator.clone(), candidate.raw_title.clone())
            .with_save_dir(dir)
            .with_category(self.config.category.clone())
    }

    async fn download(&self, candidate: &CandidateRelease, pass: Pass, origin: SearchOrigin) -> bool {
        match self.client.download(&self.request_for(candidate)).await {
            Ok(_) => {
                metrics::DOWNLOADS
                    .with_label_values(&[pass.as_str(), "started"])
                    .inc();
                info!(
                    title = %candidate.raw_title,
                    site = %candidate.site,
                    pass = pass.as_str(),
                    "Candidate downloaded"
                );
                self.notify_started(candidate, origin, false).await;
                true
            }
            Err(e) => {
                self.notify_failed(candidate, pass, e.to_string()).await;
                false
            }
        }
    }

    /// Matched episodes when the task was started.
    async fn download_partial(
        &self,
        candidate: &CandidateRelease,
        needed: &EpisodeSet,
        origin: SearchOrigin,
    ) -> Option<EpisodeSet> {
        let outcome = self
            .client
            .download_partial(self.request_for(candidate), needed)
            .await;

        match outcome {
            Ok(PartialOutcome::Started { matched, .. }) => {
                metrics::PARTIAL_SELECTIONS
                    .with_label_values(&["started"])
                    .inc();
                metrics::DOWNLOADS
                    .with_label_values(&[Pass::Superset.as_str(), "started"])
                    .inc();
                self.notify_started(candidate, origin, true).await;
                Some(matched)
            }
            Ok(PartialOutcome::NothingMatched) => {
                metrics::PARTIAL_SELECTIONS
                    .with_label_values(&["nothing_matched"])
                    .inc();
                None
            }
            Ok(PartialOutcome::TaskNotFound) => {
                metrics::PARTIAL_SELECTIONS
                    .with_label_values(&["task_not_found"])
                    .inc();
                None
            }
            Err(e) => {
                self.notify_failed(candidate, Pass::Superset, e.to_string())
                    .await;
                None
            }
        }
    }

    async fn notify_started(&self, candidate: &CandidateRelease, origin: SearchOrigin, partial: bool) {
        self.events
            .emit(AcquisitionEvent::DownloadStarted {
                origin,
                title: candidate.raw_title.clone(),
                media_type: candidate.media_type,
                site: candidate.site.clone(),
                partial,
            })
            .await;
    }

    async fn notify_failed(&self, candidate: &CandidateRelease, pass: Pass, reason: String) {
        metrics::DOWNLOADS
            .with_label_values(&[pass.as_str(), "failed"])
            .inc();
        warn!(
            title = %candidate.raw_title,
            site = %candidate.site,
            pass = pass.as_str(),
            reason = %reason,
            "Download failed, skipping candidate"
        );
        self.events
            .emit(AcquisitionEvent::DownloadFailed {
                title: candidate.raw_title.clone(),
                reason,
            })
            .await;
    }
}
