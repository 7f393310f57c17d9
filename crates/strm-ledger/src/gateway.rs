//! Ledger Gateway: the single choke-point for all ledger operations.
//!
//! ```text
//! Lifecycle Engine / Reconciler
//!     │
//!     └──► LedgerGateway::submit_*(…)
//!                │
//!                ├── closed?                → LedgerError::Closed
//!                ├── assign tx_ref (UUID v4)
//!                ├── client.submit(tx) within request_timeout
//!                │      ├── Ok(receipt)     → Ok
//!                │      ├── terminal error  → Err (as classified)
//!                │      └── transient error ─┐
//!                │                           ▼
//!                └── resolve_outcome(tx_ref): poll transaction_status
//!                       ├── Committed       → Ok(receipt)
//!                       ├── Failed          → Err(Rejected | ConflictingState)
//!                       └── NotFound/Pending after all attempts → Err(Unconfirmed)
//! ```
//!
//! The gateway never retries a submit itself. An `Unconfirmed` result means
//! the ledger reported no commit for the reference within the confirmation
//! window; if it commits later the Reconciler picks it up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use strm_schemas::Amount;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    CreateStreamOp, LedgerClient, LedgerError, LedgerInfo, LedgerOp, LedgerTx, StreamSnapshot,
    TxReceipt, TxStatus,
};

/// Fixed per-process gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// Upper bound on any single client call.
    pub request_timeout: Duration,
    /// Status polls after an ambiguous submit.
    pub confirm_attempts: u32,
    /// Spacing between status polls.
    pub confirm_backoff: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            confirm_attempts: 5,
            confirm_backoff: Duration::from_millis(500),
        }
    }
}

/// Connected, shareable handle to the ledger. Wrap in `Arc` to share.
pub struct LedgerGateway {
    client: Arc<dyn LedgerClient>,
    settings: GatewaySettings,
    info: LedgerInfo,
    closed: AtomicBool,
}

impl std::fmt::Debug for LedgerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerGateway")
            .field("info", &self.info)
            .field("settings", &self.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl LedgerGateway {
    /// Init: probe the ledger and return a ready gateway.
    ///
    /// Fails if the probe fails; there is no half-initialised gateway.
    pub async fn connect(
        client: Arc<dyn LedgerClient>,
        settings: GatewaySettings,
    ) -> Result<Self, LedgerError> {
        let info = match tokio::time::timeout(settings.request_timeout, client.ping()).await {
            Ok(res) => res?,
            Err(_) => return Err(LedgerError::Timeout),
        };
        info!(
            network = %info.network,
            contract_id = %info.contract_id,
            latest_ledger_seq = info.latest_ledger_seq,
            "ledger gateway ready"
        );
        Ok(Self {
            client,
            settings,
            info,
            closed: AtomicBool::new(false),
        })
    }

    /// Readiness probe result captured at connect time.
    pub fn info(&self) -> &LedgerInfo {
        &self.info
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Teardown. Every later call fails with [`LedgerError::Closed`].
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(contract_id = %self.info.contract_id, "ledger gateway shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.is_closed() {
            return Err(LedgerError::Closed);
        }
        Ok(())
    }

    // -- submit primitives ---------------------------------------------------

    /// Create a stream; the receipt's `stream_id` is the ledger-assigned id.
    pub async fn submit_create(&self, op: CreateStreamOp) -> Result<TxReceipt, LedgerError> {
        self.submit(LedgerOp::Create(op)).await
    }

    pub async fn submit_cancel(&self, stream_id: &str) -> Result<TxReceipt, LedgerError> {
        self.submit(LedgerOp::Cancel {
            stream_id: stream_id.to_string(),
        })
        .await
    }

    pub async fn submit_reschedule(
        &self,
        stream_id: &str,
        new_start_at: i64,
    ) -> Result<TxReceipt, LedgerError> {
        self.submit(LedgerOp::Reschedule {
            stream_id: stream_id.to_string(),
            new_start_at,
        })
        .await
    }

    pub async fn submit_claim(
        &self,
        stream_id: &str,
        amount: Amount,
    ) -> Result<TxReceipt, LedgerError> {
        self.submit(LedgerOp::Claim {
            stream_id: stream_id.to_string(),
            amount,
        })
        .await
    }

    /// Read every ledger-side stream.
    pub async fn query_all(&self) -> Result<StreamSnapshot, LedgerError> {
        self.ensure_open()?;
        match tokio::time::timeout(self.settings.request_timeout, self.client.query_streams())
            .await
        {
            Ok(res) => res,
            Err(_) => Err(LedgerError::Timeout),
        }
    }

    async fn submit(&self, op: LedgerOp) -> Result<TxReceipt, LedgerError> {
        self.ensure_open()?;

        let tx = LedgerTx {
            tx_ref: Uuid::new_v4().to_string(),
            op,
        };
        debug!(tx_ref = %tx.tx_ref, op = tx.op.name(), stream_id = ?tx.op.stream_id(), "submitting ledger transaction");

        let outcome =
            match tokio::time::timeout(self.settings.request_timeout, self.client.submit(&tx)).await
            {
                Ok(res) => res,
                Err(_) => Err(LedgerError::Timeout),
            };

        match outcome {
            Ok(receipt) => {
                info!(tx_ref = %tx.tx_ref, op = tx.op.name(), stream_id = %receipt.stream_id, ledger_seq = receipt.ledger_seq, "ledger transaction committed");
                Ok(receipt)
            }
            Err(e) if e.is_transient() => {
                warn!(tx_ref = %tx.tx_ref, op = tx.op.name(), error = %e, "submit outcome unknown; resolving against ledger");
                self.resolve_outcome(&tx.tx_ref).await
            }
            Err(e) => {
                warn!(tx_ref = %tx.tx_ref, op = tx.op.name(), error = %e, "ledger transaction refused");
                Err(e)
            }
        }
    }

    /// Poll the ledger for the final status of `tx_ref`.
    async fn resolve_outcome(&self, tx_ref: &str) -> Result<TxReceipt, LedgerError> {
        for attempt in 1..=self.settings.confirm_attempts {
            if self.is_closed() {
                break;
            }
            let status = tokio::time::timeout(
                self.settings.request_timeout,
                self.client.transaction_status(tx_ref),
            )
            .await;

            match status {
                Ok(Ok(TxStatus::Committed { receipt })) => {
                    info!(tx_ref, attempt, stream_id = %receipt.stream_id, ledger_seq = receipt.ledger_seq, "ambiguous submit resolved as committed");
                    return Ok(receipt);
                }
                Ok(Ok(TxStatus::Failed { failure })) => {
                    warn!(tx_ref, attempt, code = %failure.code, "ambiguous submit resolved as failed");
                    return Err(failure.into());
                }
                Ok(Ok(TxStatus::Pending)) | Ok(Ok(TxStatus::NotFound)) => {
                    debug!(tx_ref, attempt, "transaction not final yet");
                }
                Ok(Err(e)) if e.is_transient() => {
                    debug!(tx_ref, attempt, error = %e, "status poll failed; will retry");
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(tx_ref, attempt, "status poll timed out; will retry");
                }
            }

            if attempt < self.settings.confirm_attempts {
                tokio::time::sleep(self.settings.confirm_backoff).await;
            }
        }

        warn!(tx_ref, "submit could not be confirmed");
        Err(LedgerError::Unconfirmed {
            tx_ref: tx_ref.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TxFailure, TxStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Client whose submit and status answers are scripted in order.
    struct ScriptedClient {
        submits: Mutex<VecDeque<Result<TxReceipt, LedgerError>>>,
        statuses: Mutex<VecDeque<Result<TxStatus, LedgerError>>>,
        submit_calls: Mutex<u32>,
        status_calls: Mutex<u32>,
    }

    impl ScriptedClient {
        fn new(
            submits: Vec<Result<TxReceipt, LedgerError>>,
            statuses: Vec<Result<TxStatus, LedgerError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                submits: Mutex::new(submits.into()),
                statuses: Mutex::new(statuses.into()),
                submit_calls: Mutex::new(0),
                status_calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedClient {
        async fn ping(&self) -> Result<LedgerInfo, LedgerError> {
            Ok(LedgerInfo {
                network: "scripted".to_string(),
                contract_id: "C-TEST".to_string(),
                latest_ledger_seq: 1,
            })
        }

        async fn submit(&self, tx: &LedgerTx) -> Result<TxReceipt, LedgerError> {
            *self.submit_calls.lock().unwrap() += 1;
            self.submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(receipt(&tx.tx_ref, "s-default")))
        }

        async fn transaction_status(&self, _tx_ref: &str) -> Result<TxStatus, LedgerError> {
            *self.status_calls.lock().unwrap() += 1;
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TxStatus::NotFound))
        }

        async fn query_streams(&self) -> Result<StreamSnapshot, LedgerError> {
            Ok(StreamSnapshot {
                ledger_seq: 1,
                streams: Vec::new(),
            })
        }
    }

    fn receipt(tx_ref: &str, stream_id: &str) -> TxReceipt {
        TxReceipt {
            tx_ref: tx_ref.to_string(),
            ledger_seq: 7,
            stream_id: stream_id.to_string(),
        }
    }

    fn fast() -> GatewaySettings {
        GatewaySettings {
            request_timeout: Duration::from_secs(1),
            confirm_attempts: 3,
            confirm_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn committed_submit_returns_receipt() {
        let client = ScriptedClient::new(vec![Ok(receipt("x", "s-1"))], vec![]);
        let gw = LedgerGateway::connect(client.clone(), fast()).await.unwrap();
        let r = gw.submit_cancel("s-1").await.unwrap();
        assert_eq!(r.stream_id, "s-1");
        assert_eq!(*client.status_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn timeout_after_commit_resolves_to_success() {
        let client = ScriptedClient::new(
            vec![Err(LedgerError::Timeout)],
            vec![
                Ok(TxStatus::Pending),
                Ok(TxStatus::Committed {
                    receipt: receipt("x", "s-9"),
                }),
            ],
        );
        let gw = LedgerGateway::connect(client.clone(), fast()).await.unwrap();
        let r = gw.submit_cancel("s-9").await.unwrap();
        assert_eq!(r.stream_id, "s-9");
        assert_eq!(*client.submit_calls.lock().unwrap(), 1, "never resubmits");
        assert_eq!(*client.status_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn never_seen_reference_is_unconfirmed_transient() {
        let client = ScriptedClient::new(vec![Err(LedgerError::Transport("reset".into()))], vec![]);
        let gw = LedgerGateway::connect(client.clone(), fast()).await.unwrap();
        let err = gw.submit_cancel("s-1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Unconfirmed { .. }));
        assert!(err.is_transient());
        assert_eq!(*client.status_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn ambiguous_submit_that_failed_on_chain_is_classified() {
        let client = ScriptedClient::new(
            vec![Err(LedgerError::Timeout)],
            vec![Ok(TxStatus::Failed {
                failure: TxFailure {
                    code: "ALREADY_CANCELED".to_string(),
                    message: "stream already canceled".to_string(),
                    conflict: true,
                },
            })],
        );
        let gw = LedgerGateway::connect(client, fast()).await.unwrap();
        let err = gw.submit_cancel("s-1").await.unwrap_err();
        assert!(matches!(err, LedgerError::ConflictingState { .. }));
    }

    #[tokio::test]
    async fn terminal_rejection_is_not_polled() {
        let client = ScriptedClient::new(
            vec![Err(LedgerError::Rejected {
                code: "BAD".to_string(),
                message: "no".to_string(),
            })],
            vec![],
        );
        let gw = LedgerGateway::connect(client.clone(), fast()).await.unwrap();
        let err = gw.submit_cancel("s-1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert_eq!(*client.status_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn shutdown_closes_every_operation() {
        let client = ScriptedClient::new(vec![], vec![]);
        let gw = LedgerGateway::connect(client.clone(), fast()).await.unwrap();
        gw.shutdown();
        gw.shutdown();
        assert!(gw.is_closed());
        assert_eq!(gw.submit_cancel("s-1").await.unwrap_err(), LedgerError::Closed);
        assert_eq!(gw.query_all().await.unwrap_err(), LedgerError::Closed);
        assert_eq!(*client.submit_calls.lock().unwrap(), 0);
    }
}
