use std::sync::Arc;

use async_trait::async_trait;
use strm_ledger::LedgerGateway;
use strm_schemas::{Amount, Clock, Stream, StreamEvent, StreamSpec};
use strm_store::{RepoError, StreamGuard, StreamRepository};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{validate_spec, Intent, LifecyclePolicy, PendingTransition, Plan, StreamError};

/// Follow-up run on a freshly committed record before its gate is released.
///
/// The committed write stands whatever the hook does; failures are the
/// hook's to record.
#[async_trait]
pub trait PostCommit: Send + Sync {
    async fn after_commit(&self, guard: &StreamGuard);
}

/// Orchestrates create / cancel / reschedule / claim.
///
/// Every mutation of an existing stream runs under the repository's per-id
/// write gate, with the ledger call inside it. Creation has no prior record
/// to lock; the new record is inserted only after the ledger assigns its id.
pub struct LifecycleEngine {
    repo: Arc<StreamRepository>,
    gateway: Arc<LedgerGateway>,
    clock: Arc<dyn Clock>,
    policy: LifecyclePolicy,
    events: broadcast::Sender<StreamEvent>,
    post_commit: Option<Arc<dyn PostCommit>>,
}

impl LifecycleEngine {
    pub fn new(
        repo: Arc<StreamRepository>,
        gateway: Arc<LedgerGateway>,
        clock: Arc<dyn Clock>,
        policy: LifecyclePolicy,
        events: broadcast::Sender<StreamEvent>,
    ) -> Self {
        Self {
            repo,
            gateway,
            clock,
            policy,
            events,
            post_commit: None,
        }
    }

    pub fn with_post_commit(mut self, hook: Arc<dyn PostCommit>) -> Self {
        self.post_commit = Some(hook);
        self
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    fn publish(&self, event: StreamEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run the post-commit hook under `guard` and return what is stored after it.
    async fn settle(&self, guard: StreamGuard, committed: Stream) -> Stream {
        match &self.post_commit {
            Some(hook) => {
                hook.after_commit(&guard).await;
                guard.current().await
            }
            None => committed,
        }
    }

    pub async fn create(&self, spec: &StreamSpec) -> Result<Stream, StreamError> {
        let now = self.clock.now();
        let op = validate_spec(spec, &self.policy, now)?;

        let receipt = match self.gateway.submit_create(op.clone()).await {
            Ok(r) => r,
            Err(e) => {
                warn!(sender = %op.sender, asset_code = %op.asset_code, error = %e, "stream create refused by ledger");
                return Err(e.into());
            }
        };

        let stream = Stream {
            id: receipt.stream_id.clone(),
            sender: op.sender,
            recipient: op.recipient,
            asset_code: op.asset_code,
            total_amount: op.total_amount,
            duration_seconds: op.duration_seconds,
            start_at: op.start_at,
            canceled_at: None,
            claimed_amount: Amount::ZERO,
            version: receipt.ledger_seq,
            last_synced_at: None,
            recorded_at: self.clock.now(),
        };

        match self.repo.insert_new(stream.clone()).await {
            Ok(()) => {
                info!(stream_id = %stream.id, ledger_seq = receipt.ledger_seq, tx_ref = %receipt.tx_ref, "stream created");
                self.publish(StreamEvent::Created {
                    stream: stream.clone(),
                });
                if self.post_commit.is_none() {
                    return Ok(stream);
                }
                match self.repo.lock(&stream.id).await {
                    Ok(guard) => Ok(self.settle(guard, stream).await),
                    Err(_) => Ok(stream),
                }
            }
            // A reconcile pass recovered the ledger record first; it is authoritative.
            Err(RepoError::DuplicateId { id }) => {
                info!(stream_id = %id, "stream already recovered by reconciler");
                self.repo
                    .get(&id)
                    .await
                    .ok_or(StreamError::NotFound { id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel. Repeating a cancel returns the same snapshot without a ledger call.
    pub async fn cancel(&self, id: &str) -> Result<Stream, StreamError> {
        self.transition(id, Intent::Cancel).await
    }

    pub async fn reschedule(&self, id: &str, new_start_at: i64) -> Result<Stream, StreamError> {
        self.transition(id, Intent::Reschedule { new_start_at }).await
    }

    pub async fn claim(&self, id: &str, amount: Amount) -> Result<Stream, StreamError> {
        self.transition(id, Intent::Claim { amount }).await
    }

    async fn transition(&self, id: &str, intent: Intent) -> Result<Stream, StreamError> {
        let guard = self.repo.lock(id).await?;
        let pending = match PendingTransition::begin(guard, intent, self.clock.now()).await? {
            Plan::Unchanged(current) => {
                info!(stream_id = %id, intent = intent.name(), "transition already applied; no-op");
                return Ok(current);
            }
            Plan::Submit(p) => p,
        };

        let confirmed = pending.submit(&self.gateway).await?;
        let seq = confirmed.receipt().ledger_seq;
        let (stream, event, guard) = confirmed.commit_held(self.clock.now()).await;
        info!(stream_id = %id, intent = intent.name(), ledger_seq = seq, "transition committed");
        self.publish(event);
        Ok(self.settle(guard, stream).await)
    }
}
