use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// Liveness: unconditional 200 OK.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness: additionally requires the change-feed to have delivered at
/// least one full sync.
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.ready.load(std::sync::atomic::Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
