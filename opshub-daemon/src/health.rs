//! Daemon health reporting.
//!
//! Combines the log pipeline's `health_check()` with per-worker status
//! snapshots into a single [`DaemonHealth`] report.

use serde::Serialize;

use opshub_core::pipeline::HealthStatus;
use opshub_log_pipeline::WorkerStatus;

/// Aggregated health report for the daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall status, as reported by the log pipeline.
    pub status: HealthStatus,
    /// Daemon uptime in seconds since the orchestrator was built.
    pub uptime_secs: u64,
    /// Pipeline lifecycle state ("initialized", "running", "stopped").
    pub pipeline_state: String,
    /// One entry per tail worker.
    pub workers: Vec<WorkerStatus>,
}

impl DaemonHealth {
    /// Total lines processed across all workers.
    pub fn lines_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.lines_processed).sum()
    }

    /// Total write failures across all workers.
    pub fn write_failures(&self) -> u64 {
        self.workers.iter().map(|w| w.write_failures).sum()
    }

    /// Serialize the report as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Log the report at a level matching its status.
    pub fn log(&self) {
        match &self.status {
            HealthStatus::Healthy => tracing::debug!(
                uptime_secs = self.uptime_secs,
                workers = self.workers.len(),
                lines_processed = self.lines_processed(),
                "daemon healthy"
            ),
            HealthStatus::Degraded(reason) => tracing::warn!(
                reason = %reason,
                write_failures = self.write_failures(),
                "daemon degraded"
            ),
            HealthStatus::Unhealthy(reason) => {
                tracing::error!(reason = %reason, "daemon unhealthy")
            }
        }
    }
}
