use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Engine configuration, loaded from environment variables with a
/// `SEARCHRULER_` prefix. Listener addresses use Go's `"0"`-disables
/// convention from the original configuration surface (spec.md §6):
/// an address of `"0"` means the listener is not started.
#[derive(Debug, Clone)]
pub struct Config {
    pub metrics_bind_address: String,
    pub rules_metrics_bind_address: String,
    pub rules_metrics_refresh_rate: Duration,
    pub webserver_address: String,
    pub health_probe_bind_address: String,
    pub http_timeout: Duration,
    pub dispatcher_workers: usize,
    pub dispatcher_sweep_interval: Duration,
    pub connector_refresh_interval: Duration,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            metrics_bind_address: env_string("SEARCHRULER_METRICS_BIND_ADDRESS", "0"),
            rules_metrics_bind_address: env_string("SEARCHRULER_RULES_METRICS_BIND_ADDRESS", "0"),
            rules_metrics_refresh_rate: Duration::from_secs(env_u64(
                "SEARCHRULER_RULES_METRICS_REFRESH_RATE",
                10,
            )?),
            webserver_address: env_string("SEARCHRULER_WEBSERVER_ADDRESS", "0"),
            health_probe_bind_address: env_string(
                "SEARCHRULER_HEALTH_PROBE_BIND_ADDRESS",
                ":8081",
            ),
            http_timeout: Duration::from_secs(env_u64("SEARCHRULER_HTTP_TIMEOUT_SECONDS", 30)?),
            dispatcher_workers: env_u64("SEARCHRULER_DISPATCHER_WORKERS", 8)? as usize,
            dispatcher_sweep_interval: Duration::from_secs(env_u64(
                "SEARCHRULER_DISPATCHER_SWEEP_INTERVAL_SECONDS",
                60,
            )?),
            connector_refresh_interval: Duration::from_secs(env_u64(
                "SEARCHRULER_CONNECTOR_REFRESH_INTERVAL_SECONDS",
                30,
            )?),
            log_format: match env_string("SEARCHRULER_LOG_FORMAT", "text").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            },
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
