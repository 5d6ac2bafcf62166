//! Background sweeper for interrupted jobs.
//!
//! A crash between authorization and submission leaves a `created` job
//! with a debited reservation and no provider handle; a crash during
//! polling leaves a `submitted`/`polling` job nobody is attached to.
//! The sweeper periodically expires the former (failing and refunding
//! them) and re-attaches to the latter through the orchestrator's
//! normal drive path.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::orchestrator::JobOrchestrator;

/// Default delay between sweep cycles.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default age before an untouched job is considered abandoned. Must
/// comfortably exceed the caller-attached poll budget, or the sweeper
/// would steal jobs a live request is still driving.
const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(600);

/// Long-lived task that finishes what crashed processes started.
pub struct ResumeSweeper {
    orchestrator: Arc<JobOrchestrator>,
    sweep_interval: Duration,
    stale_grace: Duration,
}

impl ResumeSweeper {
    /// Create a sweeper with the default interval and grace window.
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            orchestrator,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }

    pub fn with_timing(
        orchestrator: Arc<JobOrchestrator>,
        sweep_interval: Duration,
        stale_grace: Duration,
    ) -> Self {
        Self {
            orchestrator,
            sweep_interval,
            stale_grace,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        tracing::info!(
            sweep_interval_ms = self.sweep_interval.as_millis() as u64,
            stale_grace_ms = self.stale_grace.as_millis() as u64,
            "Resume sweeper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Resume sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.orchestrator.sweep_once(self.stale_grace).await {
                        Ok(stats) if stats.expired + stats.finished + stats.still_running + stats.errors > 0 => {
                            tracing::info!(
                                expired = stats.expired,
                                finished = stats.finished,
                                still_running = stats.still_running,
                                errors = stats.errors,
                                "Sweep cycle done",
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Sweep cycle failed");
                        }
                    }
                }
            }
        }
    }
}
