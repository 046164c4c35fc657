//! Operator HTTP surface: health, sanitized config, metrics and manual
//! subscription triggers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use gapfill_core::download::TaskOverview;
use gapfill_core::subscription::{
    HistoryEntry, StoreError, Subscription, SubscriptionError, SubscriptionState,
};
use gapfill_core::SanitizedConfig;

use crate::metrics::{
    collect_dynamic_metrics, encode_metrics, normalize_path, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/config", get(get_config))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/history", get(list_history))
        .route("/subscriptions/{id}/search", post(search_subscription))
        .route("/downloads", get(list_downloads))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Records request duration and count per normalized path.
async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(start.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub scanning: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub subscription_id: i64,
    pub outcome: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e),
        _ => api_error(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        scanning: state.runner().is_some_and(|r| r.is_running()),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Active subscriptions, every state but `Finished`.
async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    let mut all = Vec::new();
    for sub_state in [
        SubscriptionState::New,
        SubscriptionState::Searching,
        SubscriptionState::Retained,
    ] {
        all.extend(
            state
                .store()
                .list_by_state(sub_state, None)
                .map_err(store_error)?,
        );
    }
    all.sort_by_key(|s| s.id);
    Ok(Json(all))
}

async fn list_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    state.store().history().map(Json).map_err(store_error)
}

fn backends_missing() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "acquisition backends are not configured",
    )
}

async fn list_downloads(State(state): State<Arc<AppState>>) -> Result<Json<TaskOverview>, ApiError> {
    let downloads = state.downloads().ok_or_else(backends_missing)?;
    downloads
        .overview()
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e))
}

async fn search_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SearchResponse>, ApiError> {
    let runner = state.runner().ok_or_else(backends_missing)?;

    match runner.search_subscription(id).await {
        Ok(outcome) => Ok(Json(SearchResponse {
            subscription_id: id,
            outcome: outcome.as_str().to_string(),
        })),
        Err(SubscriptionError::NotFound(_)) | Err(SubscriptionError::Store(StoreError::NotFound(_))) => {
            Err(api_error(
                StatusCode::NOT_FOUND,
                format!("subscription {} not found", id),
            ))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}
