//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `opshub-daemon`.
//! It validates configuration, installs the metrics recorder, builds the
//! log pipeline against a container runtime and drives it through
//! start → periodic health checks → graceful stop.
//!
//! # Shutdown
//!
//! On SIGTERM or SIGINT the pipeline is stopped: tail workers and the
//! retention sweeper are cancelled and joined, then the record store
//! drains its queue and closes.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use opshub_core::config::OpsHubConfig;
use opshub_core::pipeline::Pipeline;
use opshub_log_pipeline::{
    BollardRuntime, LogPipeline, LogPipelineBuilder, PipelineConfig, SourceRuntime,
};

use crate::health::DaemonHealth;
use crate::metrics_server;

/// Interval between health check log lines.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between uptime gauge updates.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator<R: SourceRuntime> {
    /// Loaded and validated configuration.
    config: OpsHubConfig,
    /// The log pipeline under management.
    pipeline: LogPipeline<R>,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator<BollardRuntime> {
    /// Build from an already-loaded configuration, connecting to the
    /// Docker socket named in `[discovery]`.
    pub fn connect(config: OpsHubConfig) -> Result<Self> {
        let runtime = BollardRuntime::connect(&config.discovery.docker_socket)
            .map_err(|e| anyhow::anyhow!("failed to create docker client: {}", e))?;
        Self::build_with_runtime(config, Arc::new(runtime))
    }
}

impl<R: SourceRuntime> Orchestrator<R> {
    /// Build from a loaded configuration and an explicit runtime.
    ///
    /// Useful for testing or when the runtime is shared.
    pub fn build_with_runtime(config: OpsHubConfig, runtime: Arc<R>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before the pipeline records anything
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_build_info();
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let pipeline = LogPipelineBuilder::new()
            .config(PipelineConfig::from_core(&config))
            .runtime(runtime)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build log pipeline: {}", e))?;

        let (shutdown_tx, _) = broadcast::channel(4);

        tracing::info!(
            log_dir = %config.storage.log_dir,
            db_path = %config.storage.db_path,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            pipeline,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline and block until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start the pipeline and block until `shutdown` resolves.
    ///
    /// `shutdown` yields the name of the trigger for logging. The pipeline
    /// is stopped even when `shutdown` fails.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        tracing::info!("starting log pipeline");
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start log pipeline: {}", e))?;

        let mut uptime_task = if self.config.metrics.enabled {
            Some(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ))
        } else {
            None
        };

        tracing::info!("entering main event loop");
        let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let signal = loop {
            tokio::select! {
                result = &mut shutdown => break result,
                _ = health_tick.tick() => self.health().await.log(),
            }
        };

        match &signal {
            Ok(name) => tracing::info!(signal = name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "shutdown signal handler failed"),
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task.take() {
            let _ = task.await;
        }

        self.shutdown().await?;
        signal.map(|_| ())
    }

    /// Stop the pipeline, waiting for in-flight lines to be written.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping log pipeline");
        self.pipeline
            .stop()
            .await
            .map_err(|e| anyhow::anyhow!("failed to stop log pipeline: {}", e))
    }

    /// Get the current aggregated health report.
    pub async fn health(&self) -> DaemonHealth {
        DaemonHealth {
            status: self.pipeline.health_check().await,
            uptime_secs: self.start_time.elapsed().as_secs(),
            pipeline_state: self.pipeline.state_name().to_owned(),
            workers: self.pipeline.worker_statuses(),
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &OpsHubConfig {
        &self.config
    }

    /// Get a reference to the managed pipeline.
    pub fn pipeline(&self) -> &LogPipeline<R> {
        &self.pipeline
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Record the build info gauge (always 1, labelled with the crate version).
fn record_build_info() {
    use opshub_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "daemon metrics recorded");
}

/// Spawn a background task that periodically updates the uptime metric.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use opshub_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
