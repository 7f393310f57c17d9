use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use strm_ledger::{LedgerError, LedgerGateway};
use strm_schemas::{Clock, FieldChange, Stream, StreamEvent};
use strm_store::{StreamGuard, StreamRepository};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{merge, MergeOutcome, RecordRules, SnapshotWatermark, SyncReport};

/// Pulls the ledger's stream set and merges it into the repository.
///
/// Each affected record is merged under its own per-id gate; there is no
/// repository-wide lock, so lifecycle operations on other ids proceed
/// concurrently. A failed pass changes nothing.
pub struct Reconciler {
    repo: Arc<StreamRepository>,
    gateway: Arc<LedgerGateway>,
    clock: Arc<dyn Clock>,
    rules: RecordRules,
    staleness_threshold_secs: i64,
    watermark: Mutex<SnapshotWatermark>,
    events: broadcast::Sender<StreamEvent>,
}

impl Reconciler {
    pub fn new(
        repo: Arc<StreamRepository>,
        gateway: Arc<LedgerGateway>,
        clock: Arc<dyn Clock>,
        rules: RecordRules,
        staleness_threshold_secs: i64,
        events: broadcast::Sender<StreamEvent>,
    ) -> Self {
        Self {
            repo,
            gateway,
            clock,
            rules,
            staleness_threshold_secs,
            watermark: Mutex::new(SnapshotWatermark::new()),
            events,
        }
    }

    pub fn last_accepted_seq(&self) -> Option<u64> {
        self.watermark
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last_accepted_seq()
    }

    pub async fn sync(&self) -> Result<SyncReport, LedgerError> {
        let snap = match self.gateway.query_all().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "reconcile: ledger query failed; local state untouched");
                return Err(e);
            }
        };

        let freshness = self
            .watermark
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .accept(&snap);
        if let Some(e) = freshness.into_error() {
            warn!(error = %e, "reconcile: stale snapshot rejected");
            return Err(e);
        }

        let now = self.clock.now();
        let mut report = SyncReport::new(snap.ledger_seq);
        let mut seen = BTreeSet::new();

        for remote in &snap.streams {
            seen.insert(remote.id.clone());

            if let Err(reason) = self.rules.check(remote) {
                warn!(stream_id = %remote.id, ledger_seq = remote.ledger_seq, %reason, "reconcile: ledger record breaks a domain invariant; refused");
                report.invalid_remote.insert(remote.id.clone(), reason);
                continue;
            }

            if self.repo.get(&remote.id).await.is_none() {
                let recovered = Stream::from_remote(remote, now);
                if self.repo.insert_new(recovered.clone()).await.is_ok() {
                    info!(stream_id = %remote.id, ledger_seq = remote.ledger_seq, "reconcile: recovered ledger-only stream");
                    report.inserted.push(remote.id.clone());
                    let _ = self.events.send(StreamEvent::Recovered { stream: recovered });
                    continue;
                }
                // Inserted concurrently by the lifecycle engine; merge instead.
            }

            let outcome = self
                .repo
                .mutate(&remote.id, |local| {
                    let outcome = merge(local, remote, now);
                    if let MergeOutcome::Applied { next, .. } = &outcome {
                        *local = next.clone();
                    }
                    outcome
                })
                .await;

            match outcome {
                Ok(MergeOutcome::Lagging {
                    local_version,
                    remote_seq,
                }) => {
                    debug!(stream_id = %remote.id, local_version, remote_seq, "reconcile: remote view lags local record");
                    report.lagging.push(remote.id.clone());
                }
                Ok(MergeOutcome::Applied { changes, .. }) if changes.is_empty() => {
                    report.unchanged += 1;
                }
                Ok(MergeOutcome::Applied { changes, .. }) => {
                    info!(stream_id = %remote.id, changes = changes.len(), "reconcile: applied ledger state");
                    report.updated.insert(remote.id.clone(), changes.clone());
                    let _ = self.events.send(StreamEvent::Reconciled {
                        stream_id: remote.id.clone(),
                        changes,
                    });
                }
                Err(e) => warn!(stream_id = %remote.id, error = %e, "reconcile: record vanished during merge"),
            }
        }

        for local in self.repo.list(|s| !seen.contains(&s.id)).await {
            let age = now - local.last_synced_at.unwrap_or(local.recorded_at);
            if age > self.staleness_threshold_secs {
                warn!(stream_id = %local.id, age_secs = age, "reconcile: local-only stream exceeds staleness threshold");
                report.stale_local.push(local.id);
            } else {
                report.pending_local.push(local.id);
            }
        }

        info!(
            ledger_seq = report.ledger_seq,
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            lagging = report.lagging.len(),
            invalid_remote = report.invalid_remote.len(),
            stale_local = report.stale_local.len(),
            unchanged = report.unchanged,
            "reconcile pass complete"
        );
        Ok(report)
    }

    /// Reconcile the single record behind `guard`, which the caller holds.
    ///
    /// Used right after a local write. The snapshot is not checked against the
    /// watermark; per-record ordering is enforced by [`merge`]. Returns the
    /// applied changes, empty when nothing moved or the view was not usable.
    pub async fn reconcile_held(&self, guard: &StreamGuard) -> Result<Vec<FieldChange>, LedgerError> {
        let snap = self.gateway.query_all().await?;
        let local = guard.current().await;
        let Some(remote) = snap.streams.iter().find(|r| r.id == local.id) else {
            debug!(stream_id = %local.id, ledger_seq = snap.ledger_seq, "post-write reconcile: ledger view does not list the stream");
            return Ok(Vec::new());
        };
        if let Err(reason) = self.rules.check(remote) {
            warn!(stream_id = %local.id, ledger_seq = remote.ledger_seq, %reason, "post-write reconcile: ledger record breaks a domain invariant; refused");
            return Ok(Vec::new());
        }

        match merge(&local, remote, self.clock.now()) {
            MergeOutcome::Lagging {
                local_version,
                remote_seq,
            } => {
                debug!(stream_id = %local.id, local_version, remote_seq, "post-write reconcile: remote view lags local record");
                Ok(Vec::new())
            }
            MergeOutcome::Applied { next, changes } => {
                guard.commit(next).await;
                if !changes.is_empty() {
                    info!(stream_id = %local.id, changes = changes.len(), "post-write reconcile: applied ledger state");
                    let _ = self.events.send(StreamEvent::Reconciled {
                        stream_id: local.id.clone(),
                        changes: changes.clone(),
                    });
                }
                Ok(changes)
            }
        }
    }
}
