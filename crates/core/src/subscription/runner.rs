//! Subscription scan loop and per-subscription state transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::classifier::RuleBook;
use crate::coverage::{CoverageRequest, SeasonNeed};
use crate::events::{AcquisitionEvent, EventSink};
use crate::identity::{LibraryInventory, MediaResolver, ResolveError, ResolveQuery};
use crate::media::{EpisodeSet, MediaIdentity, MediaType, SearchOrigin};
use crate::metrics;
use crate::searcher::{MediaSearcher, SearchOutcome, SearchTarget};

use super::{StoreError, Subscription, SubscriptionConfig, SubscriptionState, SubscriptionStore};

/// Errors that abort a scan or a single subscription search.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Subscription not found: {0}")]
    NotFound(i64),
}

/// What happened to one subscription during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Satisfied and archived.
    Finished,
    /// Searched, still wanting something.
    Retained,
    /// Identity could not be resolved; kept for a later cycle.
    Unresolved,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Finished => "finished",
            ScanOutcome::Retained => "retained",
            ScanOutcome::Unresolved => "unresolved",
        }
    }
}

/// Tally of one `subscribe_search` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub finished: usize,
    pub retained: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: ScanOutcome) {
        match outcome {
            ScanOutcome::Finished => self.finished += 1,
            ScanOutcome::Retained => self.retained += 1,
            ScanOutcome::Unresolved => self.unresolved += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.finished + self.retained + self.unresolved + self.failed
    }
}

/// Coverage to request for one subscription, or "already satisfied".
enum Plan {
    Search {
        target: SearchTarget,
        coverage: CoverageRequest,
        /// Episodes this cycle asks for, archived when satisfied.
        wanted: Option<EpisodeSet>,
    },
    AlreadySatisfied(Option<EpisodeSet>),
}

/// Drives subscriptions through `New -> Searching -> Retained | Finished`.
pub struct SubscriptionRunner {
    config: SubscriptionConfig,
    searcher: Arc<MediaSearcher>,
    store: Arc<dyn SubscriptionStore>,
    resolver: Arc<dyn MediaResolver>,
    library: Arc<dyn LibraryInventory>,
    rules: Arc<RuleBook>,
    events: Arc<dyn EventSink>,

    // Held for a whole scan so overlapping triggers never interleave
    scan_lock: Mutex<()>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SubscriptionRunner {
    pub fn new(
        config: SubscriptionConfig,
        searcher: Arc<MediaSearcher>,
        store: Arc<dyn SubscriptionStore>,
        resolver: Arc<dyn MediaResolver>,
        library: Arc<dyn LibraryInventory>,
        rules: Arc<RuleBook>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            searcher,
            store,
            resolver,
            library,
            rules,
            events,
            scan_lock: Mutex::new(()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the periodic scan loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Subscription runner already running");
            return;
        }

        let runner = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.scan_interval_secs.max(1));

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Subscription loop started");
            if let Err(e) = runner.recover_interrupted().await {
                error!(error = %e, "Failed to recover interrupted subscriptions");
            }
            if runner.config.run_on_start {
                runner.run_cycle().await;
            }
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Subscription loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !runner.running.load(Ordering::Relaxed) {
                            break;
                        }
                        runner.run_cycle().await;
                    }
                }
            }
            info!("Subscription loop stopped");
        });
    }

    /// Signal the scan loop to stop after the current cycle.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Subscription runner not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    /// One scheduled cycle: new subscriptions first, then retained ones.
    async fn run_cycle(&self) {
        for state in [SubscriptionState::New, SubscriptionState::Retained] {
            match self.subscribe_search(state).await {
                Ok(report) if report.total() > 0 => info!(
                    state = %state,
                    finished = report.finished,
                    retained = report.retained,
                    unresolved = report.unresolved,
                    failed = report.failed,
                    "Subscription scan finished"
                ),
                Ok(_) => debug!(state = %state, "No subscriptions to scan"),
                Err(e) => error!(state = %state, error = %e, "Subscription scan failed"),
            }
        }
    }

    /// Search every subscription currently in `state`, movies before shows.
    pub async fn subscribe_search(
        &self,
        state: SubscriptionState,
    ) -> Result<ScanReport, SubscriptionError> {
        let _guard = self.scan_lock.lock().await;
        let _timer = metrics::SCAN_DURATION
            .with_label_values(&[state.as_str()])
            .start_timer();

        let mut report = ScanReport::default();
        for media_type in [MediaType::Movie, MediaType::Tv] {
            let subscriptions = self.store.list_by_state(state, Some(media_type))?;
            for subscription in subscriptions {
                let id = subscription.id;
                match self.process(subscription).await {
                    Ok(outcome) => report.record(outcome),
                    Err(e) => {
                        warn!(subscription_id = id, error = %e, "Subscription search failed");
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Search one subscription regardless of its state.
    pub async fn search_subscription(&self, id: i64) -> Result<ScanOutcome, SubscriptionError> {
        let _guard = self.scan_lock.lock().await;
        let subscription = self
            .store
            .get(id)?
            .ok_or(SubscriptionError::NotFound(id))?;
        self.process(subscription).await
    }

    /// Reset subscriptions left in `Searching` by an interrupted scan.
    pub async fn recover_interrupted(&self) -> Result<usize, SubscriptionError> {
        let _guard = self.scan_lock.lock().await;
        let stuck = self.store.list_by_state(SubscriptionState::Searching, None)?;
        for subscription in &stuck {
            self.transition(subscription, SubscriptionState::Retained)?;
        }
        if !stuck.is_empty() {
            info!(count = stuck.len(), "Recovered interrupted subscriptions");
        }
        Ok(stuck.len())
    }

    async fn process(&self, subscription: Subscription) -> Result<ScanOutcome, SubscriptionError> {
        self.transition(&subscription, SubscriptionState::Searching)?;

        let result = self.search_claimed(&subscription).await;
        if result.is_err() {
            // Scans only pick up New and Retained
            if let Err(e) = self
                .store
                .update_state(subscription.id, SubscriptionState::Retained)
            {
                error!(
                    subscription_id = subscription.id,
                    error = %e,
                    "Failed to release subscription after error"
                );
            }
        }
        result
    }

    async fn search_claimed(
        &self,
        subscription: &Subscription,
    ) -> Result<ScanOutcome, SubscriptionError> {
        let Some(identity) = self.resolve(subscription).await else {
            info!(
                subscription_id = subscription.id,
                name = %subscription.name,
                "Identity not resolved, retaining subscription"
            );
            self.transition(subscription, SubscriptionState::Retained)?;
            return Ok(ScanOutcome::Unresolved);
        };

        let plan = match subscription.media_type {
            MediaType::Movie => self.plan_movie(subscription, identity).await,
            MediaType::Tv => self.plan_tv(subscription, identity).await,
        };

        let (target, coverage, wanted) = match plan {
            Plan::AlreadySatisfied(wanted) => {
                info!(subscription_id = subscription.id, "Already in library");
                self.finish(subscription, wanted.as_ref()).await?;
                return Ok(ScanOutcome::Finished);
            }
            Plan::Search {
                target,
                coverage,
                wanted,
            } => (target, coverage, wanted),
        };

        let args = subscription
            .filters
            .to_filter_args(subscription.quality_upgrade, subscription.best_rank);
        let outcome = self
            .searcher
            .search_one_media(
                &target,
                SearchOrigin::Subscription,
                coverage,
                subscription.filters.sites(),
                Some(&args),
            )
            .await;

        self.apply_outcome(subscription, &target, &outcome, wanted)
            .await
    }

    /// Canonical identity by catalog id, or by strict name lookup.
    async fn resolve(&self, subscription: &Subscription) -> Option<MediaIdentity> {
        let result = match &subscription.external_id {
            Some(external_id) => {
                self.resolver
                    .lookup(external_id, subscription.media_type)
                    .await
            }
            None => {
                let query = ResolveQuery::new(subscription.name.clone())
                    .with_year(subscription.year)
                    .with_type(subscription.media_type)
                    .strict();
                self.resolver.resolve(&query).await
            }
        };

        match result {
            Ok(Some(identity)) if !identity.title.trim().is_empty() => Some(identity),
            Ok(Some(_)) => {
                warn!(subscription_id = subscription.id, "Resolved identity has no title");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(subscription_id = subscription.id, error = %e, "Identity lookup failed");
                None
            }
        }
    }

    async fn plan_movie(&self, subscription: &Subscription, identity: MediaIdentity) -> Plan {
        if !subscription.quality_upgrade && self.library.movie_exists(&identity).await == Some(true)
        {
            return Plan::AlreadySatisfied(None);
        }
        Plan::Search {
            target: SearchTarget::new(identity),
            coverage: CoverageRequest::new(),
            wanted: None,
        }
    }

    async fn plan_tv(&self, subscription: &Subscription, mut identity: MediaIdentity) -> Plan {
        let season = subscription.season.unwrap_or(1);
        let total = subscription
            .total_episodes
            .or_else(|| identity.total_episodes(season))
            .unwrap_or(0);
        if total > 0 && identity.total_episodes(season).is_none() {
            identity = identity.with_season(season, total);
        }

        let need = match &subscription.missing_episodes {
            Some(missing) if missing.is_empty() => {
                return Plan::AlreadySatisfied(Some(EpisodeSet::new()))
            }
            Some(missing) => SeasonNeed::new(season, missing.iter().copied(), total),
            None => match subscription.start_episode {
                Some(start) if start > 1 && total >= start => {
                    SeasonNeed::new(season, start..=total, total)
                }
                _ => SeasonNeed::whole(season, total),
            },
        };
        let wanted = need.needed_episodes();
        let mut coverage = CoverageRequest::for_season(&identity, need);

        if !subscription.quality_upgrade {
            let key = identity.key();
            if let Some(library_missing) =
                self.library.missing_episodes(&identity, season, total).await
            {
                coverage.intersect_season(&key, season, &library_missing);
                if coverage.is_empty() {
                    return Plan::AlreadySatisfied(Some(wanted));
                }
            }
        }

        Plan::Search {
            target: SearchTarget::new(identity).with_season(season),
            coverage,
            wanted: Some(wanted),
        }
    }

    async fn apply_outcome(
        &self,
        subscription: &Subscription,
        target: &SearchTarget,
        outcome: &SearchOutcome,
        wanted: Option<EpisodeSet>,
    ) -> Result<ScanOutcome, SubscriptionError> {
        let winning_rank = outcome.selected.iter().map(|c| c.quality_rank).min();

        if outcome.satisfied {
            if !subscription.quality_upgrade {
                self.finish(subscription, wanted.as_ref()).await?;
                return Ok(ScanOutcome::Finished);
            }

            let first_acceptable = self
                .rules
                .first_acceptable_rank(subscription.filters.rule_group.as_deref());
            match (winning_rank, first_acceptable) {
                (Some(rank), Some(best)) if rank <= best => {
                    info!(subscription_id = subscription.id, rank = rank, "Quality target reached");
                    self.finish(subscription, wanted.as_ref()).await?;
                    return Ok(ScanOutcome::Finished);
                }
                // A group without rules cannot be upgraded any further
                (Some(_), None) => {
                    self.finish(subscription, wanted.as_ref()).await?;
                    return Ok(ScanOutcome::Finished);
                }
                _ => {}
            }
        }

        if subscription.quality_upgrade {
            if let Some(rank) = winning_rank {
                if subscription.best_rank.map_or(true, |best| rank < best) {
                    self.store.update_best_rank(subscription.id, rank)?;
                    debug!(subscription_id = subscription.id, rank = rank, "Best rank improved");
                }
            }
        }

        if subscription.media_type == MediaType::Tv {
            let season = subscription.season.unwrap_or(1);
            let key = target.identity.key();
            let total = target.identity.total_episodes(season);
            match outcome.residual.season(&key, season) {
                Some(need) if need.is_whole_season() => {
                    self.store.update_missing(subscription.id, None, total)?
                }
                Some(need) => {
                    self.store
                        .update_missing(subscription.id, Some(&need.needed_episodes()), total)?
                }
                // Fully downloaded but kept for a quality upgrade: search the same need again
                None => {}
            }
        }

        self.transition(subscription, SubscriptionState::Retained)?;
        Ok(ScanOutcome::Retained)
    }

    fn transition(
        &self,
        subscription: &Subscription,
        state: SubscriptionState,
    ) -> Result<(), SubscriptionError> {
        self.store.update_state(subscription.id, state)?;
        metrics::SUBSCRIPTION_TRANSITIONS
            .with_label_values(&[state.as_str()])
            .inc();
        debug!(subscription_id = subscription.id, state = %state, "Subscription state changed");
        Ok(())
    }

    async fn finish(
        &self,
        subscription: &Subscription,
        satisfied: Option<&EpisodeSet>,
    ) -> Result<(), SubscriptionError> {
        self.store.archive(subscription.id, satisfied)?;
        metrics::SUBSCRIPTION_TRANSITIONS
            .with_label_values(&[SubscriptionState::Finished.as_str()])
            .inc();
        info!(
            subscription_id = subscription.id,
            name = %subscription.name,
            "Subscription finished"
        );
        self.events
            .emit(AcquisitionEvent::SubscriptionFinished {
                subscription_id: subscription.id,
                name: subscription.name.clone(),
            })
            .await;
        Ok(())
    }
}
