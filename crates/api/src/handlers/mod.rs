pub mod cron;
pub mod stats;
pub mod timer;

use chrono::Utc;
use rally_core::reconcile::ReconcileReport;
use rally_core::types::Timestamp;
use serde::Serialize;

/// Summary of one reconciliation pass, shared by the user- and
/// scheduler-triggered endpoints.
#[derive(Debug, Serialize)]
pub struct SweepSummary {
    /// Sessions closed and credited by this pass.
    pub cleaned_up: usize,
    /// Sessions that could not be closed; they stay active for the next pass.
    pub failed: usize,
    /// Seconds credited across all closed sessions.
    pub credited_seconds: i64,
    pub timestamp: Timestamp,
}

impl SweepSummary {
    pub fn from_report(report: &ReconcileReport, timestamp: Timestamp) -> Self {
        Self {
            cleaned_up: report.reconciled_count(),
            failed: report.failed_count(),
            credited_seconds: report.credited_seconds(),
            timestamp,
        }
    }
}

/// Current wall-clock instant used for one request.
pub(crate) fn now() -> Timestamp {
    Utc::now()
}
