// packages/apm/src/observability/mod.rs
//! Logging and metrics for the agent itself
//!
//! - **Tracing**: `tracing-subscriber` with `EnvFilter`; RUST_LOG overrides the
//!   configured level. Plain or JSON output.
//! - **Metrics**: `metrics` facade with a Prometheus recorder.

pub mod metrics;

use crate::utils::config::LogConfig;
use crate::utils::errors::{ApmError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the log filter: RUST_LOG when set, else the configured directive
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let result = if config.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| ApmError::ConfigError(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the global Prometheus metrics recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ApmError::ConfigError(format!("Failed to install metrics recorder: {}", e)))?;

    metrics::describe();
    Ok(handle)
}
