use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AnalyticsConfig;

use super::handlers::{health_check, redirect_url, RedirectState};
use super::middleware::record_request_start;
use super::orchestrator::RedirectService;

pub fn create_redirect_router(service: Arc<RedirectService>, analytics: AnalyticsConfig) -> Router {
    let state = Arc::new(RedirectState { service, analytics });

    Router::new()
        .route("/", get(health_check))
        .route("/{code}", get(redirect_url))
        .layer(middleware::from_fn(record_request_start))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
