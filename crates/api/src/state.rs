use std::sync::Arc;
use std::time::Duration;

use rally_db::PgStudyStore;

use crate::config::ServerConfig;
use crate::middleware::throttle::TimerThrottle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: rally_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Per-user throttle on timer start and stop.
    pub timer_throttle: Arc<TimerThrottle>,
}

impl AppState {
    pub fn new(pool: rally_db::DbPool, config: ServerConfig) -> Self {
        let timer_throttle = Arc::new(TimerThrottle::new(Duration::from_millis(
            config.timer_min_interval_ms,
        )));
        Self {
            pool,
            config: Arc::new(config),
            timer_throttle,
        }
    }

    /// A persistence handle for one request or reconciliation pass.
    pub fn study_store(&self) -> PgStudyStore {
        PgStudyStore::new(self.pool.clone())
    }
}
