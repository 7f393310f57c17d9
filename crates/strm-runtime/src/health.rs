use serde::Serialize;
use strm_ledger::LedgerError;
use strm_reconcile::SyncReport;

/// Latest reconcile outcome, for readiness checks and operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileHealth {
    pub last_success_at: Option<i64>,
    pub last_ledger_seq: Option<u64>,
    pub last_failure_at: Option<i64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Local-only ids past the staleness threshold in the last successful pass.
    pub last_flagged: Vec<String>,
    /// Ledger ids refused for breaking a domain invariant in the last successful pass.
    pub last_invalid_remote: Vec<String>,
}

impl ReconcileHealth {
    pub fn record_success(&mut self, now: i64, report: &SyncReport) {
        self.last_success_at = Some(now);
        self.last_ledger_seq = Some(report.ledger_seq);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_flagged = report.stale_local.clone();
        self.last_invalid_remote = report.invalid_remote.keys().cloned().collect();
    }

    pub fn record_failure(&mut self, now: i64, err: &LedgerError) {
        self.last_failure_at = Some(now);
        self.last_error = Some(err.to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn is_healthy(&self) -> bool {
        self.last_success_at.is_some() && self.consecutive_failures == 0
    }
}
