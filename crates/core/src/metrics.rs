//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Classification (accept/reject tallies)
//! - Searches (per site, per origin)
//! - Selection (downloads per pass, partial file selections)
//! - Subscriptions (state transitions, scan duration)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Classification
// =============================================================================

/// Classified raw hits by verdict.
pub static CLASSIFICATION_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gapfill_classification_results_total",
            "Raw search hits by classification verdict",
        ),
        &["verdict"], // "accepted", "rule_fail", "no_match", "error"
    )
    .unwrap()
});

// =============================================================================
// Search
// =============================================================================

/// Searches by origin and outcome.
pub static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gapfill_searches_total", "Total media searches"),
        &["origin", "result"], // result: "satisfied", "partial", "empty", "no_download"
    )
    .unwrap()
});

/// Indexer site queries by result.
pub static SITE_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gapfill_site_queries_total", "Indexer site queries"),
        &["site", "result"], // "ok", "error"
    )
    .unwrap()
});

/// Raw hits returned per search.
pub static SEARCH_HITS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "gapfill_search_hits",
            "Raw indexer hits per search keyword",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
    )
    .unwrap()
});

// =============================================================================
// Selection
// =============================================================================

/// Download commands by selection pass and result.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gapfill_downloads_total", "Download commands issued"),
        &["pass", "result"], // pass: "movie", "whole_season", "episodes", "superset"
    )
    .unwrap()
});

/// Partial file selections by outcome.
pub static PARTIAL_SELECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gapfill_partial_selections_total",
            "Per-file selections inside season packs",
        ),
        &["outcome"], // "started", "nothing_matched", "task_not_found"
    )
    .unwrap()
});

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription state transitions.
pub static SUBSCRIPTION_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "gapfill_subscription_transitions_total",
            "Subscription state transitions",
        ),
        &["to_state"],
    )
    .unwrap()
});

/// Duration of a full subscription scan.
pub static SCAN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "gapfill_scan_duration_seconds",
            "Duration of a subscription scan",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
        &["state"],
    )
    .unwrap()
});

/// All core metrics, for registration by the host process.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CLASSIFICATION_RESULTS.clone()),
        Box::new(SEARCHES.clone()),
        Box::new(SITE_QUERIES.clone()),
        Box::new(SEARCH_HITS.clone()),
        Box::new(DOWNLOADS.clone()),
        Box::new(PARTIAL_SELECTIONS.clone()),
        Box::new(SUBSCRIPTION_TRANSITIONS.clone()),
        Box::new(SCAN_DURATION.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        DOWNLOADS.with_label_values(&["movie", "started"]).inc();
        assert!(registry
            .gather()
            .iter()
            .any(|f| f.get_name() == "gapfill_downloads_total"));
    }
}
