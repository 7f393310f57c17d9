//! Two-phase transition: remote effect first, local effect second.
//!
//! ```text
//! StreamGuard (per-id write gate held throughout)
//!     │
//!     ├── PendingTransition::begin(guard, intent, now)
//!     │        ├── admit() refuses      → Err(Validation | Conflict), record untouched
//!     │        ├── nothing to do        → Plan::Unchanged(current)
//!     │        └── needs the ledger     → Plan::Submit(pending)
//!     │
//!     ├── pending.submit(&gateway)       (the only suspension point)
//!     │        ├── Err                  → guard dropped, record untouched
//!     │        └── Ok(receipt)          → ConfirmedTransition
//!     │
//!     └── confirmed.commit(now)          → (Stream, StreamEvent), gate released
//!         confirmed.commit_held(now)     → same, gate still held by the caller
//! ```
//!
//! The commit point is [`ConfirmedTransition::commit`]. A
//! [`ConfirmedTransition`] can only be built from a [`TxReceipt`], so local
//! state never advances without remote confirmation.

use strm_ledger::{LedgerGateway, TxReceipt};
use strm_progress::{status_of, withdrawable_amount};
use strm_schemas::{Amount, Stream, StreamEvent, StreamStatus};
use strm_store::StreamGuard;
use tracing::warn;

use crate::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Cancel,
    Reschedule { new_start_at: i64 },
    Claim { amount: Amount },
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Cancel => "cancel",
            Intent::Reschedule { .. } => "reschedule",
            Intent::Claim { .. } => "claim",
        }
    }
}

/// Decide whether `intent` is admissible for `stream` at `now`.
///
/// `Ok(false)` means the intent is already satisfied (repeat cancel).
pub fn admit(stream: &Stream, intent: &Intent, now: i64) -> Result<bool, StreamError> {
    let status = status_of(stream, now);
    match *intent {
        Intent::Cancel => match status {
            StreamStatus::Canceled => Ok(false),
            StreamStatus::Completed => Err(StreamError::conflict(
                &stream.id,
                status,
                "stream already completed; nothing to cancel",
            )),
            StreamStatus::Scheduled | StreamStatus::Active => Ok(true),
        },
        Intent::Reschedule { new_start_at } => {
            if status != StreamStatus::Scheduled {
                return Err(StreamError::conflict(
                    &stream.id,
                    status,
                    "start can only change while scheduled",
                ));
            }
            if new_start_at <= now {
                return Err(StreamError::validation(
                    "new_start_at",
                    "must be strictly in the future",
                ));
            }
            let duration = i64::try_from(stream.duration_seconds).unwrap_or(i64::MAX);
            if new_start_at.checked_add(duration).is_none() {
                return Err(StreamError::validation(
                    "new_start_at",
                    "new_start_at + duration_seconds overflows",
                ));
            }
            Ok(true)
        }
        Intent::Claim { amount } => {
            if !amount.is_positive() {
                return Err(StreamError::validation("amount", "must be greater than zero"));
            }
            if status == StreamStatus::Scheduled {
                return Err(StreamError::conflict(
                    &stream.id,
                    status,
                    "nothing has been released yet",
                ));
            }
            let available = withdrawable_amount(stream, now);
            if amount > available {
                return Err(StreamError::conflict(
                    &stream.id,
                    status,
                    format!("claim of {amount} exceeds withdrawable {available}"),
                ));
            }
            Ok(true)
        }
    }
}

/// Local effect of a confirmed intent. Pure.
pub fn apply_confirmed(
    before: &Stream,
    intent: &Intent,
    receipt: &TxReceipt,
    now: i64,
) -> (Stream, StreamEvent) {
    let mut next = before.clone();
    next.version = next.version.max(receipt.ledger_seq);
    let event = match *intent {
        Intent::Cancel => {
            next.canceled_at = Some(now);
            StreamEvent::Canceled {
                stream_id: next.id.clone(),
                sender: next.sender.clone(),
                canceled_at: now,
            }
        }
        Intent::Reschedule { new_start_at } => {
            next.start_at = new_start_at;
            StreamEvent::Rescheduled {
                stream_id: next.id.clone(),
                old_start_at: before.start_at,
                new_start_at,
            }
        }
        Intent::Claim { amount } => {
            next.claimed_amount = before
                .claimed_amount
                .checked_add(amount)
                .unwrap_or(before.total_amount)
                .clamp_to(Amount::ZERO, before.total_amount);
            StreamEvent::Claimed {
                stream_id: next.id.clone(),
                recipient: next.recipient.clone(),
                amount,
            }
        }
    };
    (next, event)
}

pub enum Plan {
    /// Already in the requested state; no ledger call is needed.
    Unchanged(Stream),
    Submit(PendingTransition),
}

/// An admitted intent awaiting its ledger transaction.
pub struct PendingTransition {
    guard: StreamGuard,
    before: Stream,
    intent: Intent,
}

impl PendingTransition {
    pub async fn begin(guard: StreamGuard, intent: Intent, now: i64) -> Result<Plan, StreamError> {
        let before = guard.current().await;
        if !admit(&before, &intent, now)? {
            return Ok(Plan::Unchanged(before));
        }
        Ok(Plan::Submit(Self {
            guard,
            before,
            intent,
        }))
    }

    pub fn before(&self) -> &Stream {
        &self.before
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    /// Phase one. On failure the gate is released with the record untouched.
    pub async fn submit(self, gateway: &LedgerGateway) -> Result<ConfirmedTransition, StreamError> {
        let id = self.before.id.as_str();
        let res = match self.intent {
            Intent::Cancel => gateway.submit_cancel(id).await,
            Intent::Reschedule { new_start_at } => {
                gateway.submit_reschedule(id, new_start_at).await
            }
            Intent::Claim { amount } => gateway.submit_claim(id, amount).await,
        };
        match res {
            Ok(receipt) => Ok(self.confirm(receipt)),
            Err(e) => {
                warn!(stream_id = %id, intent = self.intent.name(), error = %e, "ledger refused transition; record unchanged");
                Err(e.into())
            }
        }
    }

    /// Attach the ledger's confirmation.
    pub fn confirm(self, receipt: TxReceipt) -> ConfirmedTransition {
        ConfirmedTransition {
            guard: self.guard,
            before: self.before,
            intent: self.intent,
            receipt,
        }
    }
}

/// A transition the ledger has committed; only the local write remains.
pub struct ConfirmedTransition {
    guard: StreamGuard,
    before: Stream,
    intent: Intent,
    receipt: TxReceipt,
}

impl ConfirmedTransition {
    pub fn receipt(&self) -> &TxReceipt {
        &self.receipt
    }

    /// Phase two: write the new state and release the gate.
    pub async fn commit(self, now: i64) -> (Stream, StreamEvent) {
        let (next, event, _guard) = self.commit_held(now).await;
        (next, event)
    }

    /// Phase two, handing the gate back for follow-up work on the same record.
    pub async fn commit_held(self, now: i64) -> (Stream, StreamEvent, StreamGuard) {
        let (next, event) = apply_confirmed(&self.before, &self.intent, &self.receipt, now);
        self.guard.commit(next.clone()).await;
        (next, event, self.guard)
    }
}
