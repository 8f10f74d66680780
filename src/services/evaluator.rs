use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::domain::rule::SearchRule;
use crate::domain::{Alert, RuleLifecycleState, RuleState};
use crate::error::{EngineError, StatusReason, StatusSink};
use crate::pools::{AlertPool, ConnectorRegistry, RulePool};
use crate::services::jsonpath;

/// Runs a single SearchRule end to end (spec.md §4.3): resolve connector,
/// execute query, extract condition value + aggregations, drive the
/// state machine, write to RulePool/AlertPool, emit a fire-event.
pub struct Evaluator {
    http: Client,
    /// Same client, minus certificate verification, for connectors with
    /// `tlsSkipVerify: true` (spec.md §4.3 step 3). reqwest has no
    /// per-request toggle for this, so both are built once up front.
    http_insecure: Client,
    connectors: Arc<ConnectorRegistry>,
    rules: Arc<RulePool>,
    alerts: Arc<AlertPool>,
    fire_tx: UnboundedSender<String>,
    status: StatusSink,
}

impl Evaluator {
    pub fn new(
        http: Client,
        connectors: Arc<ConnectorRegistry>,
        rules: Arc<RulePool>,
        alerts: Arc<AlertPool>,
        fire_tx: UnboundedSender<String>,
    ) -> Self {
        let http_insecure = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("building the TLS-skip-verify HTTP client should never fail");
        Self {
            http,
            http_insecure,
            connectors,
            rules,
            alerts,
            fire_tx,
            status: StatusSink::new(),
        }
    }

    /// Last recorded status reason for a rule, mirroring what a reconciler
    /// would write to `status.conditions` (spec.md §7).
    pub fn status_for(&self, key: &str) -> Option<StatusReason> {
        self.status.get(key)
    }

    /// `Evaluate(rule)`, called by the Scheduler at `rule.checkInterval`.
    /// Every error path is recovered locally: the tick returns without
    /// progressing the state machine (spec.md §7).
    pub async fn evaluate(&self, rule: &SearchRule) {
        let key = rule.key();

        // Step 1: resolve connector.
        let Some(connector) = self.connectors.resolve(rule) else {
            warn!(rule = %key, error = %EngineError::QueryConnectorNotFound, "evaluator step 1 failed");
            self.status.record(&key, StatusReason::from(&EngineError::QueryConnectorNotFound));
            return;
        };
        if !connector.is_usable() {
            let reason = match connector.usability {
                crate::domain::ConnectorUsability::NoCredsFound => EngineError::NoCredsFound,
                crate::domain::ConnectorUsability::NoCertsFound => EngineError::NoCertsFound,
                crate::domain::ConnectorUsability::Usable => unreachable!(),
            };
            warn!(rule = %key, error = %reason, "connector unusable");
            self.status.record(&key, StatusReason::from(&reason));
            return;
        }

        // Step 2: validate query XOR queryJSON.
        if !rule.elasticsearch.validate_query_xor() {
            warn!(rule = %key, error = %EngineError::NoQueryFound, "evaluator step 2 failed");
            self.status.record(&key, StatusReason::from(&EngineError::NoQueryFound));
            return;
        }

        // Step 3-4: compose and send the request.
        let url = format!(
            "{}/{}/_search",
            connector.spec.url.trim_end_matches('/'),
            rule.elasticsearch.index
        );
        let http = if connector.spec.tls_skip_verify {
            &self.http_insecure
        } else {
            &self.http
        };
        let mut builder = http
            .post(&url)
            .timeout(Duration::from_secs(30))
            .header("Content-Type", "application/json")
            .json(&rule.elasticsearch.body());
        for (k, v) in &connector.spec.headers {
            builder = builder.header(k, v);
        }
        if let Some(creds) = &connector.credentials {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(err) => {
                let reason = EngineError::ConnectionError(err.to_string());
                warn!(rule = %key, error = %reason, "evaluator step 4 transport error");
                self.status.record(&key, StatusReason::from(&reason));
                return;
            }
        };
        if !response.status().is_success() {
            let reason = EngineError::ConnectionError(format!("non-200 response: {}", response.status()));
            warn!(rule = %key, status = %response.status(), "evaluator step 4 non-200 response");
            self.status.record(&key, StatusReason::from(&reason));
            return;
        }
        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                let reason = EngineError::QueryError(err.to_string());
                warn!(rule = %key, error = %reason, "evaluator failed to decode response body");
                self.status.record(&key, StatusReason::from(&reason));
                return;
            }
        };

        // Step 5: extract condition field.
        let Some(value) = jsonpath::extract_f64(&body, &rule.elasticsearch.condition_field) else {
            let reason = EngineError::QueryError(format!(
                "condition field {} absent from response",
                rule.elasticsearch.condition_field
            ));
            warn!(rule = %key, field = %rule.elasticsearch.condition_field, "evaluator step 5: condition field absent");
            self.status.record(&key, StatusReason::from(&reason));
            return;
        };

        // Step 6: capture aggregations subtree verbatim.
        let aggregations = jsonpath::extract_subtree(&body, "aggregations");

        // Step 7: evaluate condition.
        let Some(threshold) = rule.condition.threshold() else {
            let reason = EngineError::EvaluatingConditionError("unparseable threshold".into());
            warn!(rule = %key, error = %reason, "evaluator step 7 failed");
            self.status.record(&key, StatusReason::from(&reason));
            return;
        };
        let firing = rule.condition.operator.compare(value, threshold);

        // Step 8: look up/create RuleState, update rule/value/aggregations.
        self.rules.entry_with(
            &key,
            || RuleState::new(rule.clone()),
            |state| {
                state.rule = rule.clone();
                state.value = value;
                state.aggregations = aggregations.clone();
            },
        );

        // Step 9: state machine.
        self.drive_state_machine(&key, firing, rule);
    }

    fn drive_state_machine(&self, key: &str, firing: bool, rule: &SearchRule) {
        let now = Instant::now();
        let for_dur = rule.condition.for_duration();

        let updated = self.rules.entry_with(
            key,
            || RuleState::new(rule.clone()),
            |state| match (state.state, firing) {
                (RuleLifecycleState::Normal, true) => {
                    state.state = RuleLifecycleState::PendingFiring;
                    state.firing_time = Some(now);
                }
                (RuleLifecycleState::Normal, false) => {}
                (RuleLifecycleState::PendingFiring, true) => {
                    let dwell_satisfied = state
                        .firing_time
                        .map(|t| now.saturating_duration_since(t) > for_dur)
                        .unwrap_or(false);
                    if dwell_satisfied {
                        state.state = RuleLifecycleState::Firing;
                    }
                }
                (RuleLifecycleState::PendingFiring, false) => {
                    state.state = RuleLifecycleState::PendingResolving;
                    state.resolving_time = Some(now);
                }
                (RuleLifecycleState::Firing, true) => {
                    // stays Firing; value already refreshed in step 8.
                }
                (RuleLifecycleState::Firing, false) => {
                    state.state = RuleLifecycleState::PendingResolving;
                    state.resolving_time = Some(now);
                }
                (RuleLifecycleState::PendingResolving, true) => {
                    state.state = RuleLifecycleState::PendingFiring;
                    state.firing_time = Some(now);
                }
                (RuleLifecycleState::PendingResolving, false) => {
                    let dwell_satisfied = state
                        .resolving_time
                        .map(|t| now.saturating_duration_since(t) > for_dur)
                        .unwrap_or(false);
                    if dwell_satisfied {
                        state.state = RuleLifecycleState::Normal;
                        state.reset_times();
                    }
                }
            },
        );

        match updated.state {
            RuleLifecycleState::Firing => {
                self.alerts.set(
                    key,
                    Alert {
                        ruler_action_name: rule.action_ref_key(),
                        search_rule: rule.clone(),
                        value: updated.value,
                        aggregations: updated.aggregations.clone(),
                    },
                );
                info!(rule = %key, "rule firing");
                if self.fire_tx.send(key.to_string()).is_err() {
                    let reason = EngineError::KubeEventCreationError("dispatcher channel closed".into());
                    warn!(rule = %key, error = %reason, "failed to emit fire-event");
                    self.status.record(key, StatusReason::from(&reason));
                }
            }
            _ => {
                // Alert invariant (spec.md §3): AlertPool holds a key iff
                // its rule is Firing. Every other state clears it,
                // including PendingResolving, so the Dispatcher's sweep
                // stops re-sending the moment a rule stops firing.
                self.alerts.delete(key);
            }
        }
    }
}

impl SearchRule {
    /// Scope-qualified key for the bound RulerAction, mirroring
    /// ConnectorKey's `"namespace/name"` resolution convention.
    pub fn action_ref_key(&self) -> String {
        let namespace = self
            .action_ref
            .namespace
            .clone()
            .unwrap_or_else(|| self.namespace.clone());
        if namespace.is_empty() {
            self.action_ref.name.clone()
        } else {
            format!("{namespace}/{}", self.action_ref.name)
        }
    }
}
