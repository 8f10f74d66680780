use std::sync::Arc;

use crate::config::Config;
use crate::pools::{AlertPool, ConnectorRegistry, RulePool};
use crate::services::metrics_exporter::MetricsExporter;
use crate::services::ruleraction_registry::RulerActionRegistry;

/// Shared handles injected into the HTTP routes (dashboard/metrics/health).
/// Evaluator/Scheduler/Dispatcher hold their own references to the same
/// `Arc`s; there are no ambient singletons (spec.md §9).
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub rules: Arc<RulePool>,
    pub alerts: Arc<AlertPool>,
    pub connectors: Arc<ConnectorRegistry>,
    pub actions: Arc<RulerActionRegistry>,
    pub metrics: Arc<MetricsExporter>,
    pub ready: Arc<std::sync::atomic::AtomicBool>,
}
