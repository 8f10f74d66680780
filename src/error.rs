use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Per-rule/per-action error taxonomy (spec.md §7). These are recovered
/// locally by the caller (Evaluator/Dispatcher) and never crash the
/// process; they surface as a logged status reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("query connector not found")]
    QueryConnectorNotFound,
    #[error("no credentials found for connector")]
    NoCredsFound,
    #[error("no certificates found for connector")]
    NoCertsFound,
    #[error("query and queryJSON must be set exactly one at a time")]
    NoQueryFound,
    #[error("transport error contacting backend: {0}")]
    ConnectionError(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("error evaluating condition: {0}")]
    EvaluatingConditionError(String),
    #[error("error evaluating template: {0}")]
    EvaluateTemplateError(String),
    #[error("fire-event side channel error: {0}")]
    KubeEventCreationError(String),
}

/// HTTP-facing error wrapper for the dashboard/health/metrics surfaces.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Display-only mirror of `EngineError`, named the way a reconciler would
/// name a `status.conditions[].reason` value. The core has no status-writing
/// sink of its own (that belongs to the reconciler, out of scope per
/// spec.md §1); `StatusSink` exists so tests and the change-feed adapter
/// can observe what would have been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReason(pub String);

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&EngineError> for StatusReason {
    fn from(err: &EngineError) -> Self {
        StatusReason(err.to_string())
    }
}

/// In-memory collector for `StatusReason`s, keyed by rule/action key.
/// Used by tests to assert that a particular failure surfaced the right
/// reason, without depending on a real status-writing backend.
#[derive(Default)]
pub struct StatusSink {
    entries: std::sync::RwLock<std::collections::HashMap<String, StatusReason>>,
}

impl StatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: &str, reason: StatusReason) {
        self.entries
            .write()
            .expect("status sink lock poisoned")
            .insert(key.to_string(), reason);
    }

    pub fn get(&self, key: &str) -> Option<StatusReason> {
        self.entries
            .read()
            .expect("status sink lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_sink_records_latest_reason_per_key() {
        let sink = StatusSink::new();
        sink.record("default/cpu-high", StatusReason::from(&EngineError::NoCredsFound));
        sink.record("default/cpu-high", StatusReason::from(&EngineError::NoCertsFound));
        assert_eq!(
            sink.get("default/cpu-high"),
            Some(StatusReason("no certificates found for connector".into()))
        );
    }
}
