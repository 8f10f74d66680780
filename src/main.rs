use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use search_ruler::changefeed::{ChangeEvent, ChangeFeedSource, EntityKind, EntityPayload, StaticChangeFeed};
use search_ruler::config::{Config, LogFormat};
use search_ruler::domain::RulerActionSpec;
use search_ruler::pools::{AlertPool, ConnectorRegistry, RulePool};
use search_ruler::secret_store::InMemorySecretStore;
use search_ruler::services::dispatcher::Dispatcher;
use search_ruler::services::evaluator::Evaluator;
use search_ruler::services::metrics_exporter::MetricsExporter;
use search_ruler::services::ruleraction_registry::RulerActionRegistry;
use search_ruler::services::scheduler::Scheduler;
use search_ruler::state::AppState;
use search_ruler::{cli, routes};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    match TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Failed to bind searchruler listener on {addr}: port already in use. Stop the other service using this port or change the bind address.",
            );
        }
        Err(err) => Err(err).with_context(|| format!("failed to bind searchruler listener on {addr}")),
    }
}

/// Normalises upstream create/update/delete events into calls to the
/// Scheduler, ConnectorRegistry, and RulerActionRegistry (ChangeFeedAdapter,
/// spec.md §2).
async fn run_change_feed(
    feed: Arc<dyn ChangeFeedSource>,
    scheduler: Arc<Scheduler>,
    connectors: Arc<ConnectorRegistry>,
    actions: Arc<RulerActionRegistry>,
    ready: Arc<AtomicBool>,
) {
    let mut events = feed.events();
    while let Some(event) = events.next().await {
        match event {
            ChangeEvent::Create(payload) | ChangeEvent::Update(payload) => match payload {
                EntityPayload::QueryConnector { key, spec } => connectors.upsert(key, spec),
                EntityPayload::SearchRule(rule) => scheduler.update(rule),
                EntityPayload::RulerAction(spec) => {
                    let key = format!("{}/{}", spec.namespace, spec.name);
                    actions.upsert(key, spec);
                }
            },
            ChangeEvent::Delete { kind, key } => match kind {
                EntityKind::QueryConnector => {
                    if let Some((namespace, name)) = key.split_once('/') {
                        connectors.delete(&search_ruler::domain::ConnectorKey::namespaced(
                            namespace, name,
                        ));
                    }
                }
                EntityKind::SearchRule => scheduler.delete(&key),
                EntityKind::RulerAction => actions.delete(&key),
            },
        }
    }
    ready.store(true, Ordering::Relaxed);
}

#[derive(serde::Deserialize)]
struct StaticBootstrap {
    #[serde(default)]
    connectors: Vec<StaticConnector>,
    #[serde(default)]
    rules: Vec<search_ruler::domain::SearchRule>,
    #[serde(default)]
    actions: Vec<RulerActionSpec>,
}

#[derive(serde::Deserialize)]
struct StaticConnector {
    key: search_ruler::domain::ConnectorKey,
    spec: search_ruler::domain::connector::QueryConnectorSpec,
}

fn load_static_events(path: &std::path::Path) -> Result<Vec<ChangeEvent>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let bootstrap: StaticBootstrap =
        serde_json::from_str(&raw).context("failed to parse rules file as JSON")?;

    let mut events = Vec::new();
    for connector in bootstrap.connectors {
        events.push(ChangeEvent::Create(EntityPayload::QueryConnector {
            key: connector.key,
            spec: connector.spec,
        }));
    }
    for rule in bootstrap.rules {
        events.push(ChangeEvent::Create(EntityPayload::SearchRule(rule)));
    }
    for action in bootstrap.actions {
        events.push(ChangeEvent::Create(EntityPayload::RulerAction(action)));
    }
    Ok(events)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let mut config = Config::from_env()?;
    if let Some(format) = &args.log_format {
        config.log_format = match format.as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::fmt().json().with_env_filter(env_filter()).init()
        }
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter()).init(),
    }

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let secret_store = Arc::new(InMemorySecretStore::new());
    let rules = Arc::new(RulePool::new());
    let alerts = Arc::new(AlertPool::new());
    let connectors = Arc::new(ConnectorRegistry::new(secret_store.clone()));
    let actions = Arc::new(RulerActionRegistry::new(secret_store));
    let metrics = Arc::new(MetricsExporter::new(rules.clone()));
    let ready = Arc::new(AtomicBool::new(false));

    let cancel = CancellationToken::new();

    let (fire_tx, fire_rx) = tokio::sync::mpsc::unbounded_channel();
    let evaluator = Arc::new(Evaluator::new(
        http.clone(),
        connectors.clone(),
        rules.clone(),
        alerts.clone(),
        fire_tx,
    ));
    let scheduler = Arc::new(Scheduler::new(
        evaluator,
        rules.clone(),
        alerts.clone(),
        cancel.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        http,
        alerts.clone(),
        actions.clone(),
        config.dispatcher_workers,
    ));
    dispatcher.start(fire_rx, config.dispatcher_sweep_interval, cancel.clone());

    connectors.clone().start_refresh_loop(config.connector_refresh_interval, cancel.clone());
    metrics.clone().start(config.rules_metrics_refresh_rate, cancel.clone());

    let state = AppState {
        config: config.clone(),
        rules,
        alerts,
        connectors: connectors.clone(),
        actions: actions.clone(),
        metrics,
        ready: ready.clone(),
    };

    let feed: Arc<dyn ChangeFeedSource> = if let Some(path) = &args.rules_file {
        Arc::new(StaticChangeFeed::new(load_static_events(path)?))
    } else {
        Arc::new(StaticChangeFeed::new(Vec::new()))
    };
    tokio::spawn(run_change_feed(feed, scheduler, connectors, actions, ready));

    let mut servers = Vec::new();

    if state.config.webserver_address != "0" {
        let listener = bind_listener(&state.config.webserver_address).await?;
        let app = routes::dashboard_router(state.clone());
        servers.push(tokio::spawn(async move {
            axum::serve(listener, app).await
        }));
    }

    if state.config.rules_metrics_bind_address != "0" {
        let listener = bind_listener(&state.config.rules_metrics_bind_address).await?;
        let app = routes::metrics_router(state.clone());
        servers.push(tokio::spawn(async move {
            axum::serve(listener, app).await
        }));
    }

    if state.config.health_probe_bind_address != "0" {
        let listener = bind_listener(&state.config.health_probe_bind_address).await?;
        let app = routes::health_router(state.clone());
        servers.push(tokio::spawn(async move {
            axum::serve(listener, app).await
        }));
    }

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    cancel.cancel();
    for server in servers {
        server.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::bind_listener;
    use anyhow::Result;

    #[tokio::test]
    async fn reports_port_in_use_with_actionable_message() -> Result<()> {
        let listener = match std::net::TcpListener::bind("127.0.0.1:0") {
            Ok(listener) => listener,
            Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let addr = listener.local_addr()?;

        let err = bind_listener(&addr.to_string()).await.unwrap_err();
        let message = err.to_string().to_lowercase();
        if message.contains("operation not permitted") {
            return Ok(());
        }

        assert!(message.contains(&addr.to_string()));
        assert!(message.contains("port already in use"));

        drop(listener);
        Ok(())
    }
}
