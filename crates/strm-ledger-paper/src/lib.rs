//! Deterministic in-memory "paper" ledger.
//!
//! Design decisions (kept intentionally simple/deterministic):
//! - Stream ids are `strm-{n:06}` in creation order, so id order is creation order.
//! - Every committed transaction advances `ledger_seq` by exactly one.
//! - Contract time comes from the injected [`Clock`]; no wall clock reads.
//! - A `tx_ref` that already committed (or failed) returns its original
//!   outcome; nothing commits twice.
//! - Snapshots stamp every stream with the snapshot's `ledger_seq`.
//!
//! Fault injection covers the outcomes the gateway must handle: terminal
//! rejection, timeout before commit, timeout after commit, an unavailable
//! query endpoint and a lagging (frozen) query view. Faults are consumed in
//! FIFO order by the next submit.
//!
//! The `*_out_of_band` methods mutate contract state directly, standing in
//! for another client acting on-chain.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use strm_ledger::{
    CreateStreamOp, LedgerClient, LedgerError, LedgerInfo, LedgerOp, LedgerTx, StreamSnapshot,
    TxFailure, TxReceipt, TxStatus,
};
use strm_schemas::{Amount, Clock, RemoteStream, Stream, StreamStatus};
use tracing::debug;

pub const PAPER_NETWORK: &str = "paper";

/// One scripted misbehaviour, consumed by the next submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitFault {
    /// Fail terminally without committing.
    Reject { code: String, message: String },
    /// Drop the request before it reaches the contract.
    TimeoutBeforeCommit,
    /// Commit, then lose the response.
    TimeoutAfterCommit,
}

#[derive(Debug, Default)]
struct Inner {
    ledger_seq: u64,
    next_stream: u64,
    streams: BTreeMap<String, RemoteStream>,
    outcomes: BTreeMap<String, TxStatus>,
    submit_faults: VecDeque<SubmitFault>,
    query_failures: u32,
    frozen_view: Option<StreamSnapshot>,
    offline: bool,
    submissions: Vec<LedgerTx>,
}

/// Shareable paper ledger. Clone the `Arc`, not the ledger.
pub struct PaperLedger {
    contract_id: String,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl PaperLedger {
    pub fn new(contract_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            contract_id: contract_id.into(),
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -- fault injection -----------------------------------------------------

    pub fn inject(&self, fault: SubmitFault) {
        self.lock().submit_faults.push_back(fault);
    }

    pub fn reject_next(&self, code: &str, message: &str) {
        self.inject(SubmitFault::Reject {
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Fail the next `n` snapshot queries with a transport error.
    pub fn fail_next_queries(&self, n: u32) {
        self.lock().query_failures += n;
    }

    /// Serve the current snapshot for every query until [`thaw_view`](Self::thaw_view).
    pub fn freeze_view(&self) {
        let mut g = self.lock();
        let snap = snapshot_of(&g);
        g.frozen_view = Some(snap);
    }

    /// Serve `snapshot` (typically an older one) for every query until thawed.
    pub fn pin_view(&self, snapshot: StreamSnapshot) {
        self.lock().frozen_view = Some(snapshot);
    }

    pub fn thaw_view(&self) {
        self.lock().frozen_view = None;
    }

    /// While offline every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    // -- inspection ----------------------------------------------------------

    pub fn ledger_seq(&self) -> u64 {
        self.lock().ledger_seq
    }

    pub fn remote(&self, stream_id: &str) -> Option<RemoteStream> {
        let g = self.lock();
        g.streams.get(stream_id).map(|s| RemoteStream {
            ledger_seq: g.ledger_seq,
            ..s.clone()
        })
    }

    /// Every submit that reached this ledger, including faulted ones.
    pub fn submissions(&self) -> Vec<LedgerTx> {
        self.lock().submissions.clone()
    }

    pub fn submit_count(&self, op_name: &str) -> usize {
        self.lock()
            .submissions
            .iter()
            .filter(|tx| tx.op.name() == op_name)
            .count()
    }

    // -- out-of-band contract calls ------------------------------------------

    pub fn create_out_of_band(&self, op: CreateStreamOp) -> Result<TxReceipt, TxFailure> {
        let now = self.clock.now();
        let mut g = self.lock();
        apply(&mut g, now, "oob:create", &LedgerOp::Create(op))
    }

    pub fn cancel_out_of_band(&self, stream_id: &str) -> Result<TxReceipt, TxFailure> {
        let now = self.clock.now();
        let mut g = self.lock();
        let op = LedgerOp::Cancel {
            stream_id: stream_id.to_string(),
        };
        apply(&mut g, now, "oob:cancel", &op)
    }

    pub fn reschedule_out_of_band(
        &self,
        stream_id: &str,
        new_start_at: i64,
    ) -> Result<TxReceipt, TxFailure> {
        let now = self.clock.now();
        let mut g = self.lock();
        let op = LedgerOp::Reschedule {
            stream_id: stream_id.to_string(),
            new_start_at,
        };
        apply(&mut g, now, "oob:reschedule", &op)
    }

    pub fn claim_out_of_band(&self, stream_id: &str, amount: Amount) -> Result<TxReceipt, TxFailure> {
        let now = self.clock.now();
        let mut g = self.lock();
        let op = LedgerOp::Claim {
            stream_id: stream_id.to_string(),
            amount,
        };
        apply(&mut g, now, "oob:claim", &op)
    }
}

fn offline_error() -> LedgerError {
    LedgerError::Transport("paper ledger offline".to_string())
}

fn snapshot_of(g: &Inner) -> StreamSnapshot {
    StreamSnapshot {
        ledger_seq: g.ledger_seq,
        streams: g
            .streams
            .values()
            .map(|s| RemoteStream {
                ledger_seq: g.ledger_seq,
                ..s.clone()
            })
            .collect(),
    }
}

fn failure(code: &str, message: &str, conflict: bool) -> TxFailure {
    TxFailure {
        code: code.to_string(),
        message: message.to_string(),
        conflict,
    }
}

fn as_stream(remote: &RemoteStream) -> Stream {
    Stream::from_remote(remote, 0)
}

/// Run contract rules for `op` at contract time `now` and commit on success.
fn apply(g: &mut Inner, now: i64, tx_ref: &str, op: &LedgerOp) -> Result<TxReceipt, TxFailure> {
    let stream_id = match op {
        LedgerOp::Create(c) => {
            if !c.total_amount.is_positive() {
                return Err(failure("BAD_AMOUNT", "total amount must be positive", false));
            }
            if c.duration_seconds == 0 {
                return Err(failure("BAD_DURATION", "duration must be positive", false));
            }
            if c.sender == c.recipient {
                return Err(failure("SELF_STREAM", "sender equals recipient", false));
            }
            g.next_stream += 1;
            let id = format!("strm-{:06}", g.next_stream);
            g.streams.insert(
                id.clone(),
                RemoteStream {
                    id: id.clone(),
                    sender: c.sender.clone(),
                    recipient: c.recipient.clone(),
                    asset_code: c.asset_code.clone(),
                    total_amount: c.total_amount,
                    duration_seconds: c.duration_seconds,
                    start_at: c.start_at,
                    canceled_at: None,
                    claimed_amount: Amount::ZERO,
                    ledger_seq: 0,
                },
            );
            id
        }
        LedgerOp::Cancel { stream_id } => {
            let s = g
                .streams
                .get_mut(stream_id)
                .ok_or_else(|| failure("STREAM_NOT_FOUND", stream_id, false))?;
            match strm_progress::status_of(&as_stream(s), now) {
                StreamStatus::Canceled => {
                    return Err(failure("ALREADY_CANCELED", "stream already canceled", true))
                }
                StreamStatus::Completed => {
                    return Err(failure("ALREADY_COMPLETED", "stream already completed", true))
                }
                StreamStatus::Scheduled | StreamStatus::Active => {}
            }
            s.canceled_at = Some(now);
            stream_id.clone()
        }
        LedgerOp::Reschedule {
            stream_id,
            new_start_at,
        } => {
            let s = g
                .streams
                .get_mut(stream_id)
                .ok_or_else(|| failure("STREAM_NOT_FOUND", stream_id, false))?;
            if strm_progress::status_of(&as_stream(s), now) != StreamStatus::Scheduled {
                return Err(failure("NOT_SCHEDULED", "stream is no longer scheduled", true));
            }
            if *new_start_at <= now {
                return Err(failure("START_IN_PAST", "new start must be in the future", false));
            }
            s.start_at = *new_start_at;
            stream_id.clone()
        }
        LedgerOp::Claim { stream_id, amount } => {
            let s = g
                .streams
                .get_mut(stream_id)
                .ok_or_else(|| failure("STREAM_NOT_FOUND", stream_id, false))?;
            if !amount.is_positive() {
                return Err(failure("BAD_AMOUNT", "claim amount must be positive", false));
            }
            let view = as_stream(s);
            if strm_progress::status_of(&view, now) == StreamStatus::Scheduled {
                return Err(failure("NOT_STARTED", "nothing released yet", true));
            }
            if *amount > strm_progress::withdrawable_amount(&view, now) {
                return Err(failure("INSUFFICIENT_RELEASED", "claim exceeds withdrawable", true));
            }
            s.claimed_amount += *amount;
            stream_id.clone()
        }
    };

    g.ledger_seq += 1;
    let receipt = TxReceipt {
        tx_ref: tx_ref.to_string(),
        ledger_seq: g.ledger_seq,
        stream_id,
    };
    debug!(tx_ref, op = op.name(), stream_id = %receipt.stream_id, ledger_seq = receipt.ledger_seq, "paper ledger commit");
    Ok(receipt)
}

#[async_trait]
impl LedgerClient for PaperLedger {
    async fn ping(&self) -> Result<LedgerInfo, LedgerError> {
        let g = self.lock();
        if g.offline {
            return Err(offline_error());
        }
        Ok(LedgerInfo {
            network: PAPER_NETWORK.to_string(),
            contract_id: self.contract_id.clone(),
            latest_ledger_seq: g.ledger_seq,
        })
    }

    async fn submit(&self, tx: &LedgerTx) -> Result<TxReceipt, LedgerError> {
        let now = self.clock.now();
        let mut g = self.lock();
        if g.offline {
            return Err(offline_error());
        }
        g.submissions.push(tx.clone());

        // Idempotent on tx_ref.
        if let Some(prev) = g.outcomes.get(&tx.tx_ref) {
            return match prev.clone() {
                TxStatus::Committed { receipt } => Ok(receipt),
                TxStatus::Failed { failure } => Err(failure.into()),
                TxStatus::Pending | TxStatus::NotFound => Err(LedgerError::Timeout),
            };
        }

        let fault = g.submit_faults.pop_front();
        match fault {
            Some(SubmitFault::Reject { code, message }) => {
                let f = failure(&code, &message, false);
                g.outcomes.insert(
                    tx.tx_ref.clone(),
                    TxStatus::Failed { failure: f.clone() },
                );
                Err(f.into())
            }
            Some(SubmitFault::TimeoutBeforeCommit) => Err(LedgerError::Timeout),
            Some(SubmitFault::TimeoutAfterCommit) => {
                let outcome = apply(&mut g, now, &tx.tx_ref, &tx.op);
                record(&mut g, &tx.tx_ref, &outcome);
                Err(LedgerError::Timeout)
            }
            None => {
                let outcome = apply(&mut g, now, &tx.tx_ref, &tx.op);
                record(&mut g, &tx.tx_ref, &outcome);
                outcome.map_err(LedgerError::from)
            }
        }
    }

    async fn transaction_status(&self, tx_ref: &str) -> Result<TxStatus, LedgerError> {
        let g = self.lock();
        if g.offline {
            return Err(offline_error());
        }
        Ok(g.outcomes.get(tx_ref).cloned().unwrap_or(TxStatus::NotFound))
    }

    async fn query_streams(&self) -> Result<StreamSnapshot, LedgerError> {
        let mut g = self.lock();
        if g.offline {
            return Err(offline_error());
        }
        if g.query_failures > 0 {
            g.query_failures -= 1;
            return Err(LedgerError::Transport("paper ledger query unavailable".to_string()));
        }
        if let Some(frozen) = &g.frozen_view {
            return Ok(frozen.clone());
        }
        Ok(snapshot_of(&g))
    }
}

fn record(g: &mut Inner, tx_ref: &str, outcome: &Result<TxReceipt, TxFailure>) {
    let status = match outcome {
        Ok(receipt) => TxStatus::Committed {
            receipt: receipt.clone(),
        },
        Err(f) => TxStatus::Failed { failure: f.clone() },
    };
    g.outcomes.insert(tx_ref.to_string(), status);
}

/// Convenience constructor for tests and local wiring.
pub fn create_op(
    sender: &str,
    recipient: &str,
    asset_code: &str,
    total_units: i64,
    duration_seconds: u64,
    start_at: i64,
) -> CreateStreamOp {
    CreateStreamOp {
        sender: sender.to_string(),
        recipient: recipient.to_string(),
        asset_code: asset_code.to_string(),
        total_amount: Amount::from_units(total_units).unwrap_or(Amount::ZERO),
        duration_seconds,
        start_at,
    }
}
