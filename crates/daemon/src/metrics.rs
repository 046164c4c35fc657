//! Prometheus metrics for the operator endpoint.
//!
//! HTTP request metrics and subscription gauges live here; the acquisition
//! counters come from `gapfill_core::metrics` and share the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

use gapfill_core::SubscriptionState;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "gapfill_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gapfill_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

// =============================================================================
// Subscription Metrics
// =============================================================================

/// Active subscriptions by state (collected on scrape).
pub static SUBSCRIPTIONS_BY_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "gapfill_subscriptions_by_state",
            "Current subscription count by state",
        ),
        &["state"],
    )
    .unwrap()
});

/// 1 while the periodic scan loop is running.
pub static RUNNER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "gapfill_subscription_runner_running",
        "Whether the subscription scan loop is running",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    let local: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(SUBSCRIPTIONS_BY_STATE.clone()),
        Box::new(RUNNER_RUNNING.clone()),
    ];
    for metric in local.into_iter().chain(gapfill_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "Failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges from the store and runner before a scrape.
pub fn collect_dynamic_metrics(state: &AppState) {
    RUNNER_RUNNING.set(state.runner().map_or(0, |r| i64::from(r.is_running())));

    for sub_state in [
        SubscriptionState::New,
        SubscriptionState::Searching,
        SubscriptionState::Retained,
    ] {
        match state.store().list_by_state(sub_state, None) {
            Ok(subs) => SUBSCRIPTIONS_BY_STATE
                .with_label_values(&[sub_state.as_str()])
                .set(subs.len() as i64),
            Err(e) => warn!(state = %sub_state, error = %e, "Failed to count subscriptions"),
        }
    }
}

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Replace numeric path segments so ids do not explode label cardinality.
pub fn normalize_path(path: &str) -> String {
    // Run twice: adjacent numeric segments share the separating slash
    let once = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    NUMERIC_SEGMENT.replace_all(&once, "/{id}$1").into_owned()
}
