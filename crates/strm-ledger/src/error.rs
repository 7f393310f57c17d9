use std::fmt;

use crate::TxFailure;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerErrorKind {
    /// Retrying later may succeed; nothing was committed.
    Transient,
    /// Terminal: the contract or gateway refused. Do not retry blindly.
    Rejected,
    /// Terminal: the contract refused because of the stream's current state.
    ConflictingState,
}

impl LedgerErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerErrorKind::Transient => "TRANSIENT",
            LedgerErrorKind::Rejected => "REJECTED",
            LedgerErrorKind::ConflictingState => "CONFLICTING_STATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network or transport failure.
    Transport(String),
    /// No response within the request timeout.
    Timeout,
    /// The contract rejected the transaction.
    Rejected { code: String, message: String },
    /// The contract rejected the transaction because of current stream state.
    ConflictingState { code: String, message: String },
    /// A response payload could not be decoded.
    Decode(String),
    /// The transaction was broadcast but its outcome could not be confirmed
    /// within the configured attempts, and the ledger reports no commit.
    Unconfirmed { tx_ref: String },
    /// A query returned a view older than one already accepted.
    StaleView { accepted_seq: u64, got_seq: u64 },
    /// The gateway was shut down (or never connected).
    Closed,
}

impl LedgerError {
    pub fn kind(&self) -> LedgerErrorKind {
        match self {
            LedgerError::Transport(_)
            | LedgerError::Timeout
            | LedgerError::Unconfirmed { .. }
            | LedgerError::StaleView { .. } => LedgerErrorKind::Transient,
            LedgerError::ConflictingState { .. } => LedgerErrorKind::ConflictingState,
            LedgerError::Rejected { .. } | LedgerError::Decode(_) | LedgerError::Closed => {
                LedgerErrorKind::Rejected
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == LedgerErrorKind::Transient
    }
}

impl From<TxFailure> for LedgerError {
    fn from(f: TxFailure) -> Self {
        if f.conflict {
            LedgerError::ConflictingState {
                code: f.code,
                message: f.message,
            }
        } else {
            LedgerError::Rejected {
                code: f.code,
                message: f.message,
            }
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Transport(m) => write!(f, "ledger transport error: {m}"),
            LedgerError::Timeout => write!(f, "ledger request timed out"),
            LedgerError::Rejected { code, message } => {
                write!(f, "ledger rejected transaction [{code}]: {message}")
            }
            LedgerError::ConflictingState { code, message } => {
                write!(f, "ledger refused due to stream state [{code}]: {message}")
            }
            LedgerError::Decode(m) => write!(f, "ledger response decode error: {m}"),
            LedgerError::Unconfirmed { tx_ref } => write!(
                f,
                "transaction {tx_ref} could not be confirmed; ledger reports no commit"
            ),
            LedgerError::StaleView {
                accepted_seq,
                got_seq,
            } => write!(
                f,
                "stale ledger view: got seq {got_seq}, already accepted seq {accepted_seq}"
            ),
            LedgerError::Closed => write!(f, "ledger gateway is closed"),
        }
    }
}

impl std::error::Error for LedgerError {}
