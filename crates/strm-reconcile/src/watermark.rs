//! Snapshot monotonicity watermark.
//!
//! Tracks the `ledger_seq` of the last accepted [`StreamSnapshot`] and
//! rejects any snapshot read at an older sequence (e.g. a load-balanced RPC
//! node that is behind).
//!
//! # Invariants
//!
//! - **Non-decreasing**: accepted iff `ledger_seq >=` the last accepted one.
//! - **Advances only on acceptance**.
//! - **Pure, no IO**.

use strm_ledger::{LedgerError, StreamSnapshot};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SnapshotFreshness {
    Fresh,
    Stale { accepted_seq: u64, got_seq: u64 },
}

impl SnapshotFreshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, SnapshotFreshness::Fresh)
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fresh()
    }

    /// Transient error for a rejected snapshot.
    pub fn into_error(self) -> Option<LedgerError> {
        match self {
            SnapshotFreshness::Fresh => None,
            SnapshotFreshness::Stale {
                accepted_seq,
                got_seq,
            } => Some(LedgerError::StaleView {
                accepted_seq,
                got_seq,
            }),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotWatermark {
    last_accepted_seq: Option<u64>,
}

impl SnapshotWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only probe.
    pub fn check(&self, snap: &StreamSnapshot) -> SnapshotFreshness {
        match self.last_accepted_seq {
            Some(accepted) if snap.ledger_seq < accepted => SnapshotFreshness::Stale {
                accepted_seq: accepted,
                got_seq: snap.ledger_seq,
            },
            _ => SnapshotFreshness::Fresh,
        }
    }

    pub fn accept(&mut self, snap: &StreamSnapshot) -> SnapshotFreshness {
        let result = self.check(snap);
        if result.is_fresh() {
            self.last_accepted_seq = Some(snap.ledger_seq);
        }
        result
    }

    pub fn last_accepted_seq(&self) -> Option<u64> {
        self.last_accepted_seq
    }

    pub fn has_accepted_any(&self) -> bool {
        self.last_accepted_seq.is_some()
    }
}
