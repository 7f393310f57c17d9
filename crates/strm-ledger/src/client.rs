use async_trait::async_trait;

use crate::{LedgerError, LedgerInfo, LedgerTx, StreamSnapshot, TxReceipt, TxStatus};

/// Transport to the ledger contract.
///
/// Implementations must be safe for concurrent use and must classify their
/// failures: anything where the transaction may or may not have been
/// broadcast is [`LedgerError::Transport`] or [`LedgerError::Timeout`].
///
/// Callers outside this crate go through [`crate::LedgerGateway`]; the
/// gateway adds transaction references and outcome resolution.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Readiness probe.
    async fn ping(&self) -> Result<LedgerInfo, LedgerError>;

    /// Broadcast one transaction and wait for its commit.
    ///
    /// Submitting a `tx_ref` the ledger has already committed must return the
    /// original receipt, not commit twice.
    async fn submit(&self, tx: &LedgerTx) -> Result<TxReceipt, LedgerError>;

    /// Look up the outcome of a previously submitted reference.
    async fn transaction_status(&self, tx_ref: &str) -> Result<TxStatus, LedgerError>;

    /// Read every stream the contract knows.
    async fn query_streams(&self) -> Result<StreamSnapshot, LedgerError>;
}
