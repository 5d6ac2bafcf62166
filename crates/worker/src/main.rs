//! `photoloom-worker` -- background job recovery daemon.
//!
//! Runs alongside the API process and periodically sweeps the jobs
//! table: stale unsubmitted jobs are expired and refunded, and jobs
//! still polling with no active waiter are resumed against the compute
//! provider until they settle. Terminal transitions publish events so
//! email notifications fire even for jobs whose original caller is
//! long gone.
//!
//! Schema migrations are applied by the API binary; the worker only
//! verifies connectivity at startup.
//!
//! # Environment variables
//!
//! | Variable                  | Required | Default | Description                              |
//! |---------------------------|----------|---------|------------------------------------------|
//! | `DATABASE_URL`            | yes      | --      | Postgres connection string               |
//! | `SWEEP_INTERVAL_SECS`     | no       | `60`    | Seconds between sweep passes             |
//! | `SWEEP_STALE_GRACE_SECS`  | no       | `600`   | Age before an idle job is swept          |

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photoloom_compute::{HttpComputeProvider, ProviderConfig};
use photoloom_db::store::PgStore;
use photoloom_events::{EmailConfig, EmailDelivery, EmailNotifier, EventBus};
use photoloom_orchestrator::{JobOrchestrator, PollConfig, ResumeSweeper};

/// Default seconds between sweep passes.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default age in seconds before an idle in-flight job is swept.
const DEFAULT_STALE_GRACE_SECS: u64 = 600;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photoloom_worker=debug,photoloom_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = photoloom_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    photoloom_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    // Spawn the email notifier when SMTP is configured.
    let notifier_handle = EmailConfig::from_env().map(|email_config| {
        tracing::info!(host = %email_config.smtp_host, "Email notifier enabled");
        tokio::spawn(EmailNotifier::run(
            pool.clone(),
            event_bus.subscribe(),
            EmailDelivery::new(email_config),
        ))
    });
    if notifier_handle.is_none() {
        tracing::info!("SMTP_HOST not set, email notifications disabled");
    }

    // --- Sweep timing ---
    let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    let stale_grace_secs: u64 = std::env::var("SWEEP_STALE_GRACE_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_STALE_GRACE_SECS);

    // --- Orchestrator + sweeper ---
    let provider = HttpComputeProvider::from_config(ProviderConfig::from_env());
    let orchestrator = Arc::new(JobOrchestrator::new(
        Arc::new(PgStore::new(pool)),
        Arc::new(provider),
        Arc::clone(&event_bus),
        PollConfig::from_env(),
    ));

    let sweeper = ResumeSweeper::with_timing(
        orchestrator,
        Duration::from_secs(sweep_interval_secs),
        Duration::from_secs(stale_grace_secs),
    );

    tracing::info!(
        sweep_interval_secs,
        stale_grace_secs,
        "Starting photoloom-worker",
    );

    let cancel = CancellationToken::new();
    let sweeper_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { sweeper.run(cancel).await }
    });

    // --- Wait for shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    // --- Post-shutdown cleanup ---
    if tokio::time::timeout(Duration::from_secs(10), sweeper_handle)
        .await
        .is_err()
    {
        tracing::warn!("Sweeper did not stop within 10s, abandoning");
    }

    // Drop the event bus sender to close the broadcast channel. This
    // signals the notifier loop to shut down.
    drop(event_bus);
    if let Some(handle) = notifier_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Email notifier shut down");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the daemon
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
