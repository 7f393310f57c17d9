use serde::{Deserialize, Serialize};
use strm_schemas::{Amount, RemoteStream};

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Contract call payload for stream creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStreamOp {
    pub sender: String,
    pub recipient: String,
    pub asset_code: String,
    pub total_amount: Amount,
    pub duration_seconds: u64,
    pub start_at: i64,
}

/// One contract call. Each submit is exactly one remote transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOp {
    Create(CreateStreamOp),
    Cancel { stream_id: String },
    Reschedule { stream_id: String, new_start_at: i64 },
    Claim { stream_id: String, amount: Amount },
}

impl LedgerOp {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerOp::Create(_) => "create",
            LedgerOp::Cancel { .. } => "cancel",
            LedgerOp::Reschedule { .. } => "reschedule",
            LedgerOp::Claim { .. } => "claim",
        }
    }

    pub fn stream_id(&self) -> Option<&str> {
        match self {
            LedgerOp::Create(_) => None,
            LedgerOp::Cancel { stream_id }
            | LedgerOp::Reschedule { stream_id, .. }
            | LedgerOp::Claim { stream_id, .. } => Some(stream_id),
        }
    }
}

/// An operation tagged with its client-assigned transaction reference.
///
/// The reference is the idempotency key on the ledger side and the handle the
/// gateway polls when the submit outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTx {
    pub tx_ref: String,
    pub op: LedgerOp,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Proof that a transaction committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_ref: String,
    /// Ledger sequence the transaction committed in.
    pub ledger_seq: u64,
    /// Stream the transaction created or touched.
    pub stream_id: String,
}

/// Contract-level failure of a transaction that did reach the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFailure {
    pub code: String,
    pub message: String,
    /// `true` when the contract refused because of the stream's current
    /// state (already canceled, already started, ...), rather than bad input.
    #[serde(default)]
    pub conflict: bool,
}

/// Final (or not-yet-final) status of a transaction reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxStatus {
    Committed { receipt: TxReceipt },
    Failed { failure: TxFailure },
    Pending,
    /// The ledger has never seen this reference.
    NotFound,
}

/// Every stream the contract knows, read at one ledger sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub ledger_seq: u64,
    pub streams: Vec<RemoteStream>,
}

/// Readiness probe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInfo {
    pub network: String,
    pub contract_id: String,
    pub latest_ledger_seq: u64,
}
