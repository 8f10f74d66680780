use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::rule::{ActionMode, SearchRule};
use crate::domain::Alert;
use crate::error::EngineError;
use crate::pools::AlertPool;
use crate::services::ruleraction_registry::RulerActionRegistry;
use crate::services::template::{TemplateContext, TemplateEngine};
use crate::services::validators::ValidatorRegistry;

/// Consumes fire-events and, for resilience, sweeps AlertPool on a slow
/// periodic tick (default 60s, spec.md §4.5).
pub struct Dispatcher {
    http: Client,
    /// Same client, minus certificate verification, for webhooks with
    /// `tlsSkipVerify: true` (spec.md §4.5 step 4).
    http_insecure: Client,
    alerts: Arc<AlertPool>,
    actions: Arc<RulerActionRegistry>,
    templates: TemplateEngine,
    validators: ValidatorRegistry,
    /// Coalesces a pending key while one dispatch for it is already
    /// in-flight, per spec.md §9's bounded-queue coalescing rule.
    in_flight: Mutex<HashSet<String>>,
    /// Bounds how many dispatches run at once (spec.md §5's optional
    /// worker pool, `SEARCHRULER_DISPATCHER_WORKERS`).
    workers: Arc<tokio::sync::Semaphore>,
}

impl Dispatcher {
    pub fn new(http: Client, alerts: Arc<AlertPool>, actions: Arc<RulerActionRegistry>, workers: usize) -> Self {
        let http_insecure = Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .expect("building the TLS-skip-verify HTTP client should never fail");
        Self {
            http,
            http_insecure,
            alerts,
            actions,
            templates: TemplateEngine::new(),
            validators: ValidatorRegistry::new(),
            in_flight: Mutex::new(HashSet::new()),
            workers: Arc::new(tokio::sync::Semaphore::new(workers.max(1))),
        }
    }

    pub fn start(
        self: Arc<Self>,
        mut fire_rx: UnboundedReceiver<String>,
        sweep_interval: Duration,
        cancel: CancellationToken,
    ) {
        let sweep_self = self.clone();
        let sweep_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                tokio::select! {
                    _ = sweep_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        for key in sweep_self.alerts.get_all().keys().cloned().collect::<Vec<_>>() {
                            sweep_self.clone().spawn_dispatch(key);
                        }
                    }
                }
            }
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = fire_rx.recv() => {
                        match event {
                            Some(key) => self.clone().spawn_dispatch(key),
                            None => break,
                        }
                    }
                }
            }
        });
    }

    /// Acquires a worker-pool permit and runs the dispatch on its own
    /// task, so a slow webhook can't hold up the fire-event or sweep loop.
    fn spawn_dispatch(self: Arc<Self>, key: String) {
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let Ok(permit) = workers.acquire_owned().await else {
                return;
            };
            self.dispatch(key).await;
            drop(permit);
        });
    }

    /// `Dispatch(alertKey)` (spec.md §4.5 steps 1-9).
    pub async fn dispatch(self: Arc<Self>, alert_key: String) {
        {
            let mut in_flight = self.in_flight.lock().expect("dispatcher lock poisoned");
            if in_flight.contains(&alert_key) {
                // A dispatch for this key is already queued; drop the
                // duplicate rather than queueing it again.
                return;
            }
            in_flight.insert(alert_key.clone());
        }
        self.dispatch_inner(&alert_key).await;
        self.in_flight.lock().expect("dispatcher lock poisoned").remove(&alert_key);
    }

    async fn dispatch_inner(&self, alert_key: &str) {
        // Step 1: resolve the alert.
        let Some(alert) = self.alerts.get(alert_key) else {
            return;
        };

        // Step 2: resolve the bound RulerAction.
        let Some(action) = self.actions.resolve(&alert.ruler_action_name, &alert.search_rule) else {
            warn!(alert = %alert_key, "ruler action not found for dispatch");
            return;
        };

        // Step 3: action credentials are resolved as part of `action` by
        // the registry (mirrors ConnectorRegistry's resolution).

        // Step 4-7: build the request body per mode.
        let body = match self.build_body(&alert) {
            Ok(body) => body,
            Err(err) => {
                warn!(alert = %alert_key, error = %err, "failed to build dispatch body");
                return;
            }
        };

        // Step 8: validate if configured.
        if let Some(validator_name) = &action.webhook.validator {
            match self.validators.validate(validator_name, &body) {
                Ok(outcome) if outcome.ok => {}
                Ok(outcome) => {
                    warn!(alert = %alert_key, hint = %outcome.hint, "validator rejected payload, skipping send");
                    return;
                }
                Err(err) => {
                    warn!(alert = %alert_key, error = %err, "validator lookup failed, skipping send");
                    return;
                }
            }
        }

        // Step 9: send.
        let http = if action.webhook.tls_skip_verify {
            &self.http_insecure
        } else {
            &self.http
        };
        let mut builder = http
            .request(action.webhook.verb.as_method(), &action.webhook.url)
            .timeout(Duration::from_secs(30))
            .header("Content-Type", "application/json")
            .body(body);
        for (k, v) in &action.webhook.headers {
            builder = builder.header(k, v);
        }
        if let Some(creds) = &action.credentials {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                // Body is read and discarded regardless of status code.
                let _ = resp.bytes().await;
                if !status.is_success() {
                    info!(alert = %alert_key, %status, "webhook responded non-2xx; not retried this tick");
                }
            }
            Err(err) => {
                warn!(alert = %alert_key, error = %EngineError::ConnectionError(err.to_string()), "dispatch transport error");
            }
        }
    }

    fn build_body(&self, alert: &Alert) -> Result<String, EngineError> {
        let rule: &SearchRule = &alert.search_rule;
        let ctx = TemplateContext {
            value: alert.value,
            object: rule,
            aggregations: &alert.aggregations,
        };

        match rule.action_ref.mode {
            ActionMode::Alertmanager => {
                let now = Utc::now();
                let ends_at = now + chrono::Duration::seconds(2 * rule.check_interval_secs as i64);

                let mut labels = std::collections::HashMap::new();
                for (k, v) in &rule.action_ref.labels {
                    labels.insert(k.clone(), self.templates.render(v, &ctx)?);
                }
                labels
                    .entry("alertname".to_string())
                    .or_insert_with(|| rule.name.clone());

                let mut annotations = std::collections::HashMap::new();
                for (k, v) in &rule.action_ref.annotations {
                    annotations.insert(k.clone(), self.templates.render(v, &ctx)?);
                }

                let payload = serde_json::json!([{
                    "labels": labels,
                    "annotations": annotations,
                    "startsAt": now.to_rfc3339(),
                    "endsAt": ends_at.to_rfc3339(),
                }]);
                Ok(payload.to_string())
            }
            ActionMode::Raw => {
                let data = rule.action_ref.data.clone().unwrap_or_default();
                self.templates.render(&data, &ctx)
            }
        }
    }
}
