pub mod dashboard;
pub mod health;
pub mod metrics;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn dashboard_router(state: AppState) -> Router {
    Router::new()
        .route("/api/rules", get(dashboard::get_rules))
        .with_state(state)
}

pub fn metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics::get_metrics))
        .with_state(state)
}

pub fn health_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .with_state(state)
}
