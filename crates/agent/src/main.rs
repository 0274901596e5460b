//! Power Agent - hysteresis-based power controller for the GPU nodes
//!
//! Watches cluster load through Prometheus and powers cillium3/cillium4
//! on or off through the cleanup service and their BMCs.

use agent_lib::{
    collector::{PrometheusProvider, SnmpPowerMeter},
    control::ControlLoopBuilder,
    executor::{IpmiExecutor, SchedulerClient},
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    record::CsvRecorder,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const CLUSTER_NAME: &str = "cillium";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting power-agent");

    let config = config::AgentConfig::load()?;
    config.validate()?;
    info!(
        prometheus_url = %config.prometheus_url,
        record_dir = %config.record_dir.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    for component in components::ALL {
        health_registry.register(component).await;
    }

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(CLUSTER_NAME);
    logger.log_startup(AGENT_VERSION);

    // Collaborators
    let provider = PrometheusProvider::new(&config.prometheus_url)?;
    let scheduler = SchedulerClient::new(&config.cleanup_url)?;
    let executor = IpmiExecutor::new(scheduler, config.ipmi_config());
    let power_meter = SnmpPowerMeter::new(config.snmp_config());
    let recorder = CsvRecorder::new(&config.record_dir);
    recorder
        .ensure_dir()
        .with_context(|| format!("Cannot create {}", config.record_dir.display()))?;

    let control = ControlLoopBuilder::new()
        .provider(Arc::new(provider))
        .executor(Arc::new(executor))
        .power_meter(Arc::new(power_meter))
        .recorder(Arc::new(recorder))
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .config(config.control_config())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let control_handle = tokio::spawn(control.run(shutdown_rx));

    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    if let Err(e) = control_handle.await {
        error!(error = %e, "Control loop task failed");
    }
    info!("Shutdown complete");

    Ok(())
}
