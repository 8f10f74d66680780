use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::RuleLifecycleState;
use crate::state::AppState;

#[derive(Serialize)]
pub struct DashboardAlert {
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub state: &'static str,
    pub active_at: String,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub alerts: Vec<DashboardAlert>,
}

/// `GET /api/rules` — read-only dashboard contract (spec.md §6). The
/// HTML dashboard itself is an external collaborator; only this JSON
/// shape is implemented here.
pub async fn get_rules(State(state): State<AppState>) -> Json<DashboardResponse> {
    let snapshot = state.rules.get_all();
    let mut alerts: Vec<DashboardAlert> = snapshot
        .into_iter()
        .map(|(key, rule_state)| {
            let (namespace, name) = key
                .split_once('/')
                .map(|(ns, n)| (ns.to_string(), n.to_string()))
                .unwrap_or((String::new(), key.clone()));

            let mut labels = HashMap::new();
            labels.insert("alertname".to_string(), name);
            labels.insert("namespace".to_string(), namespace);

            let mut annotations = HashMap::new();
            if let Some(description) = &rule_state.rule.description {
                annotations.insert("description".to_string(), description.clone());
                annotations.insert("summary".to_string(), description.clone());
            }

            let dashboard_state = match rule_state.state {
                RuleLifecycleState::PendingFiring | RuleLifecycleState::PendingResolving => {
                    "pending"
                }
                RuleLifecycleState::Firing => "firing",
                RuleLifecycleState::Normal => "resolved",
            };

            let active_at = rule_state
                .firing_time
                .map(|_| chrono::Utc::now().to_rfc3339())
                .unwrap_or_default();

            DashboardAlert {
                labels,
                annotations,
                state: dashboard_state,
                active_at,
            }
        })
        .collect();
    alerts.sort_by(|a, b| a.labels["alertname"].cmp(&b.labels["alertname"]));

    Json(DashboardResponse { alerts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pools::{AlertPool, ConnectorRegistry, RulePool};
    use crate::secret_store::InMemorySecretStore;
    use crate::services::metrics_exporter::MetricsExporter;
    use crate::services::ruleraction_registry::RulerActionRegistry;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn state() -> AppState {
        let rules = Arc::new(RulePool::new());
        AppState {
            config: Config {
                metrics_bind_address: "0".into(),
                rules_metrics_bind_address: "0".into(),
                rules_metrics_refresh_rate: Duration::from_secs(10),
                webserver_address: "0".into(),
                health_probe_bind_address: ":8081".into(),
                http_timeout: Duration::from_secs(30),
                dispatcher_workers: 8,
                dispatcher_sweep_interval: Duration::from_secs(60),
                connector_refresh_interval: Duration::from_secs(30),
                log_format: crate::config::LogFormat::Text,
            },
            rules: rules.clone(),
            alerts: Arc::new(AlertPool::new()),
            connectors: Arc::new(ConnectorRegistry::new(Arc::new(InMemorySecretStore::new()))),
            actions: Arc::new(RulerActionRegistry::new(Arc::new(InMemorySecretStore::new()))),
            metrics: Arc::new(MetricsExporter::new(rules)),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    #[tokio::test]
    async fn empty_pool_yields_empty_alert_list() {
        use axum::extract::State as AxumState;
        let Json(response) = get_rules(AxumState(state())).await;
        assert!(response.alerts.is_empty());
    }
}
