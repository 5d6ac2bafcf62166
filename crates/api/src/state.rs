use std::sync::Arc;

use photoloom_db::DbPool;
use photoloom_orchestrator::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable (inner data is behind `Arc`
/// or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, for read paths that go straight to the
    /// repositories.
    pub pool: DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Job orchestrator; every credit-spending operation goes through it.
    pub orchestrator: Arc<JobOrchestrator>,
}
