//! Periodic stale-session reconciliation.
//!
//! Closes sessions whose client stopped sending heartbeats without waiting
//! for an external scheduler to hit the cron endpoint. Runs on a fixed
//! interval using `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use rally_core::reconcile::Reconciler;
use rally_db::{DbPool, PgStudyStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::StudyConfig;

/// Run the stale sweep loop every `every` until `cancel` is triggered.
///
/// A failed pass is logged and retried on the next tick.
pub async fn run(pool: DbPool, study: StudyConfig, every: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = every.as_secs(),
        idle_threshold_secs = study.reconciler.idle_threshold.num_seconds(),
        zone = %study.boundary.zone(),
        "Stale sweep started"
    );

    let store = PgStudyStore::new(pool);
    let reconciler = Reconciler::new(&store, &study.boundary, &study.reconciler);

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale sweep stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = reconciler.reconcile_stale(Utc::now()).await {
                    tracing::error!(error = %e, "Stale sweep: pass failed");
                }
            }
        }
    }
}
