use std::collections::BTreeMap;

use strm_schemas::FieldChange;

/// Outcome of one reconcile pass. Id lists are ordered by id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Sequence of the snapshot this pass merged.
    pub ledger_seq: u64,
    /// Ledger-only records inserted locally.
    pub inserted: Vec<String>,
    /// Records whose fields changed, with the applied changes.
    pub updated: BTreeMap<String, Vec<FieldChange>>,
    /// Remote views older than the local record; ignored.
    pub lagging: Vec<String>,
    /// Ledger records that break a domain invariant, with the reason. Not stored.
    pub invalid_remote: BTreeMap<String, String>,
    /// Local-only records older than the staleness threshold. Not modified.
    pub stale_local: Vec<String>,
    /// Local-only records still within the threshold.
    pub pending_local: Vec<String>,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn new(ledger_seq: u64) -> Self {
        Self {
            ledger_seq,
            ..Self::default()
        }
    }

    /// `true` when the pass changed nothing and flagged nothing.
    pub fn is_quiet(&self) -> bool {
        self.inserted.is_empty()
            && self.updated.is_empty()
            && self.lagging.is_empty()
            && self.invalid_remote.is_empty()
            && self.stale_local.is_empty()
    }

    pub fn has_flags(&self) -> bool {
        !self.stale_local.is_empty() || !self.invalid_remote.is_empty()
    }
}
