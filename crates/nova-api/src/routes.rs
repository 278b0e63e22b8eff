//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::account::{get_account, get_last_result, mark_result_seen, reconcile_account};
use crate::handlers::generate::generate_video;
use crate::handlers::store::{buy_addon, buy_credits, buy_pack, buy_plan};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let generation_routes = Router::new().route("/generate-video", post(generate_video));

    let store_routes = Router::new()
        .route("/store/addon", post(buy_addon))
        .route("/store/pack", post(buy_pack))
        .route("/store/plan", post(buy_plan))
        .route("/store/credits", post(buy_credits));

    let account_routes = Router::new()
        .route("/account", get(get_account))
        .route("/account/reconcile", post(reconcile_account))
        .route("/account/last-result", get(get_last_result))
        .route("/account/last-result/seen", post(mark_result_seen));

    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(generation_routes)
        .merge(store_routes)
        .merge(account_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
