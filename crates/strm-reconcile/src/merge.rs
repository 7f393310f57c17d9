//! Conflict policy between a local record and the ledger's view of it.
//!
//! Pure, deterministic; no IO.
//!
//! - Ordering: a remote view read at `ledger_seq < local.version` is older
//!   than state already applied locally and is ignored (`Lagging`).
//! - Ledger wins: for a view at least as recent, every remote field replaces
//!   the local one, with two monotonic exceptions:
//!     - a remote view without cancellation never clears a local `canceled_at`;
//!     - `claimed_amount` never decreases.
//! - Bookkeeping: `version` advances to the view's sequence and
//!   `last_synced_at` to `now`, even when no field changed.

use strm_schemas::{FieldChange, RemoteStream, Stream};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// `next` is the record to commit; `changes` is empty when only
    /// bookkeeping moved.
    Applied {
        next: Stream,
        changes: Vec<FieldChange>,
    },
    Lagging {
        local_version: u64,
        remote_seq: u64,
    },
}

impl MergeOutcome {
    pub fn is_lagging(&self) -> bool {
        matches!(self, MergeOutcome::Lagging { .. })
    }
}

fn opt_ts(v: Option<i64>) -> String {
    v.map_or_else(|| "none".to_string(), |t| t.to_string())
}

fn track<T: PartialEq + ToString>(
    changes: &mut Vec<FieldChange>,
    field: &str,
    local: &mut T,
    remote: T,
) {
    if *local != remote {
        changes.push(FieldChange {
            field: field.to_string(),
            local: local.to_string(),
            remote: remote.to_string(),
        });
        *local = remote;
    }
}

pub fn merge(local: &Stream, remote: &RemoteStream, now: i64) -> MergeOutcome {
    debug_assert_eq!(local.id, remote.id);

    if remote.ledger_seq < local.version {
        return MergeOutcome::Lagging {
            local_version: local.version,
            remote_seq: remote.ledger_seq,
        };
    }

    let mut next = local.clone();
    let mut changes = Vec::new();

    track(&mut changes, "sender", &mut next.sender, remote.sender.clone());
    track(&mut changes, "recipient", &mut next.recipient, remote.recipient.clone());
    track(&mut changes, "asset_code", &mut next.asset_code, remote.asset_code.clone());
    track(&mut changes, "total_amount", &mut next.total_amount, remote.total_amount);
    track(
        &mut changes,
        "duration_seconds",
        &mut next.duration_seconds,
        remote.duration_seconds,
    );
    track(&mut changes, "start_at", &mut next.start_at, remote.start_at);

    if remote.canceled_at.is_some() && remote.canceled_at != local.canceled_at {
        changes.push(FieldChange {
            field: "canceled_at".to_string(),
            local: opt_ts(local.canceled_at),
            remote: opt_ts(remote.canceled_at),
        });
        next.canceled_at = remote.canceled_at;
    }

    if remote.claimed_amount > local.claimed_amount {
        track(
            &mut changes,
            "claimed_amount",
            &mut next.claimed_amount,
            remote.claimed_amount,
        );
    }

    next.version = remote.ledger_seq;
    next.last_synced_at = Some(now);

    MergeOutcome::Applied { next, changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strm_schemas::Amount;

    fn local() -> Stream {
        Stream {
            id: "s-1".to_string(),
            sender: "GSENDER".to_string(),
            recipient: "GRECIP".to_string(),
            asset_code: "USDC".to_string(),
            total_amount: Amount::from_units(100).unwrap(),
            duration_seconds: 3_600,
            start_at: 1_000,
            canceled_at: None,
            claimed_amount: Amount::ZERO,
            version: 5,
            last_synced_at: None,
            recorded_at: 900,
        }
    }

    fn remote_of(s: &Stream, seq: u64) -> RemoteStream {
        RemoteStream {
            id: s.id.clone(),
            sender: s.sender.clone(),
            recipient: s.recipient.clone(),
            asset_code: s.asset_code.clone(),
            total_amount: s.total_amount,
            duration_seconds: s.duration_seconds,
            start_at: s.start_at,
            canceled_at: s.canceled_at,
            claimed_amount: s.claimed_amount,
            ledger_seq: seq,
        }
    }

    fn applied(o: MergeOutcome) -> (Stream, Vec<FieldChange>) {
        match o {
            MergeOutcome::Applied { next, changes } => (next, changes),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn identical_view_only_moves_bookkeeping() {
        let l = local();
        let (next, changes) = applied(merge(&l, &remote_of(&l, 8), 2_000));
        assert!(changes.is_empty());
        assert_eq!(next.version, 8);
        assert_eq!(next.last_synced_at, Some(2_000));
    }

    #[test]
    fn remote_cancel_and_reschedule_win() {
        let l = local();
        let mut r = remote_of(&l, 6);
        r.canceled_at = Some(1_500);
        r.start_at = 1_200;

        let (next, changes) = applied(merge(&l, &r, 2_000));
        assert_eq!(next.canceled_at, Some(1_500));
        assert_eq!(next.start_at, 1_200);
        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["start_at", "canceled_at"]);
    }

    #[test]
    fn older_view_is_lagging_and_ignored() {
        let l = local();
        let mut r = remote_of(&l, 4);
        r.canceled_at = Some(1_500);
        assert_eq!(
            merge(&l, &r, 2_000),
            MergeOutcome::Lagging {
                local_version: 5,
                remote_seq: 4
            }
        );
    }

    #[test]
    fn cancellation_and_claims_never_regress() {
        let mut l = local();
        l.canceled_at = Some(1_100);
        l.claimed_amount = Amount::from_units(10).unwrap();
        let mut r = remote_of(&l, 9);
        r.canceled_at = None;
        r.claimed_amount = Amount::from_units(3).unwrap();

        let (next, changes) = applied(merge(&l, &r, 2_000));
        assert_eq!(next.canceled_at, Some(1_100));
        assert_eq!(next.claimed_amount, Amount::from_units(10).unwrap());
        assert!(changes.is_empty());
    }

    #[test]
    fn merge_is_idempotent() {
        let l = local();
        let mut r = remote_of(&l, 7);
        r.canceled_at = Some(1_500);
        r.claimed_amount = Amount::from_units(4).unwrap();

        let (once, _) = applied(merge(&l, &r, 2_000));
        let (twice, changes) = applied(merge(&once, &r, 2_000));
        assert_eq!(once, twice);
        assert!(changes.is_empty());
    }
}
