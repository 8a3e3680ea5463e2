//! Alert Bridge - forwards monitoring appliance alerts to an incident API
//!
//! Runs the poll loop, the dedup sweeper and the HTTP surface (probes,
//! metrics, webhook and manual triggers) until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use bridge_lib::{
    api::{create_router, AppState},
    health::HealthRegistry,
    observability::{BridgeMetrics, MetricsRecorder, StructuredLogger},
    poller::PollLoopBuilder,
    Pipeline,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting alert-bridge");

    let config = config::BridgeConfig::load()?;
    info!(config = ?config, "Bridge configured");

    let health_registry = HealthRegistry::new();
    let metrics = BridgeMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let pipeline = build_pipeline(&config, &health_registry, &metrics, &logger).await?;
    let polling_enabled = pipeline.as_ref().map_or(false, |p| p.polling_enabled);
    logger.log_startup(BRIDGE_VERSION, polling_enabled);

    let mut tasks = Vec::new();
    if let Some(pipeline) = &pipeline {
        let recorder: Arc<dyn MetricsRecorder> = Arc::new(metrics.clone());
        tasks.push(tokio::spawn(pipeline.dedup.clone().run_sweeper(
            config.sweep_interval(),
            recorder,
            health_registry.clone(),
            shutdown_tx.subscribe(),
        )));

        if pipeline.polling_enabled {
            let poll_loop = PollLoopBuilder::new()
                .poller(pipeline.poller.clone())
                .interval(config.poll_interval())
                .jitter(config.poll_jitter())
                .build()?;
            tasks.push(tokio::spawn(poll_loop.run(shutdown_tx.subscribe())));
        } else {
            info!("Polling disabled, running in webhook-only mode");
        }
        health_registry.set_ready(true).await;
    }

    let app_state = Arc::new(AppState::new(
        config.instance_name.clone(),
        health_registry.clone(),
        metrics.clone(),
        pipeline,
    ));

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!(addr = %addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, create_router(app_state))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    let reason = shutdown_signal().await;
    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }
    server
        .await
        .context("API server task panicked")?
        .context("API server failed")?;

    info!("Shutdown complete");
    Ok(())
}

/// Build the pipeline, or `None` when required settings are missing
async fn build_pipeline(
    config: &config::BridgeConfig,
    health: &HealthRegistry,
    metrics: &BridgeMetrics,
    logger: &StructuredLogger,
) -> Result<Option<Arc<Pipeline>>> {
    let missing = config.missing_settings();
    let monitoring = config.monitoring_config()?;
    let monitoring = match monitoring {
        Some(monitoring) if missing.is_empty() => monitoring,
        _ => {
            warn!(
                missing = ?missing,
                "Required settings missing, alert pipeline disabled"
            );
            health.block_readiness("missing configuration").await;
            return Ok(None);
        }
    };

    Pipeline::register_health(health).await;
    let pipeline = Pipeline::connect(
        monitoring,
        &config.pagerduty_events_url,
        config.request_timeout(),
        config.pipeline_options()?,
        Arc::new(metrics.clone()),
        logger.clone(),
        health.clone(),
    )
    .context("failed to initialize alert pipeline")?;

    if !config.oneview_ssl_verify {
        warn!("TLS certificate verification disabled for the monitoring API");
    }

    Ok(Some(Arc::new(pipeline)))
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
