//! Scenario: reconcile passes against the paper ledger.
//!
//! 1. A ledger-only stream (crash between submit and local insert) is recovered.
//! 2. A cancellation made directly on-chain converges locally.
//! 3. A snapshot older than one already merged is rejected; nothing changes.
//! 4. A per-record view older than the local version is reported lagging.
//! 5. Local-only records are kept, and flagged once past the threshold.
//! 6. A failed query leaves local state untouched; the next pass succeeds.
//! 7. A pass waits for an in-flight lifecycle transition on the same id.
//! 8. A ledger record that breaks a domain invariant is refused, not stored.

use std::sync::Arc;
use std::time::Duration;

use strm_ledger::{GatewaySettings, LedgerClient, LedgerGateway, StreamSnapshot};
use strm_ledger_paper::{create_op, PaperLedger};
use strm_progress::status_of;
use strm_reconcile::{RecordRules, Reconciler};
use strm_progress::calculate_progress;
use strm_schemas::{Amount, ManualClock, RemoteStream, Stream, StreamEvent, StreamStatus};
use strm_store::StreamRepository;
use tokio::sync::broadcast;

const T: i64 = 1_700_000_000;
const STALE_AFTER: i64 = 600;

struct Harness {
    clock: Arc<ManualClock>,
    ledger: Arc<PaperLedger>,
    repo: Arc<StreamRepository>,
    reconciler: Arc<Reconciler>,
    events: broadcast::Receiver<StreamEvent>,
}

async fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(T));
    let ledger = Arc::new(PaperLedger::new("paper-contract", clock.clone()));
    let gateway = LedgerGateway::connect(
        ledger.clone(),
        GatewaySettings {
            request_timeout: Duration::from_secs(1),
            confirm_attempts: 1,
            confirm_backoff: Duration::from_millis(1),
        },
    )
    .await
    .unwrap();
    let repo = Arc::new(StreamRepository::new());
    let (tx, rx) = broadcast::channel(64);
    let reconciler = Arc::new(Reconciler::new(
        repo.clone(),
        Arc::new(gateway),
        clock.clone(),
        RecordRules::new(["USDC"], 60),
        STALE_AFTER,
        tx,
    ));
    Harness {
        clock,
        ledger,
        repo,
        reconciler,
        events: rx,
    }
}

fn local_only(id: &str, recorded_at: i64) -> Stream {
    Stream {
        id: id.to_string(),
        sender: "GSENDER".to_string(),
        recipient: "GRECIP".to_string(),
        asset_code: "USDC".to_string(),
        total_amount: Amount::from_units(10).unwrap(),
        duration_seconds: 600,
        start_at: recorded_at,
        canceled_at: None,
        claimed_amount: Amount::ZERO,
        version: 0,
        last_synced_at: None,
        recorded_at,
    }
}

#[tokio::test]
async fn ledger_only_stream_is_recovered() {
    let mut h = harness().await;
    let r = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T))
        .unwrap();

    let report = h.reconciler.sync().await.unwrap();

    assert_eq!(report.inserted, vec![r.stream_id.clone()]);
    let s = h.repo.get(&r.stream_id).await.unwrap();
    assert_eq!(s.version, r.ledger_seq);
    assert_eq!(s.last_synced_at, Some(T));
    assert!(matches!(h.events.try_recv().unwrap(), StreamEvent::Recovered { .. }));
}

#[tokio::test]
async fn on_chain_cancel_converges_to_canceled() {
    let mut h = harness().await;
    let r = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T + 3_600))
        .unwrap();
    h.reconciler.sync().await.unwrap();
    let _ = h.events.try_recv();
    assert_eq!(
        status_of(&h.repo.get(&r.stream_id).await.unwrap(), T),
        StreamStatus::Scheduled
    );

    h.clock.advance(60);
    h.ledger.cancel_out_of_band(&r.stream_id).unwrap();
    let report = h.reconciler.sync().await.unwrap();

    assert!(report.updated.contains_key(&r.stream_id));
    let s = h.repo.get(&r.stream_id).await.unwrap();
    assert_eq!(s.canceled_at, Some(T + 60));
    assert_eq!(status_of(&s, T + 60), StreamStatus::Canceled);
    assert!(matches!(h.events.try_recv().unwrap(), StreamEvent::Reconciled { .. }));

    let again = h.reconciler.sync().await.unwrap();
    assert!(again.is_quiet());
    assert_eq!(again.unchanged, 1);
}

#[tokio::test]
async fn older_snapshot_is_rejected_after_a_newer_one() {
    let h = harness().await;
    let r = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T + 3_600))
        .unwrap();
    let old = h.ledger.query_streams().await.unwrap();
    h.ledger.cancel_out_of_band(&r.stream_id).unwrap();
    h.reconciler.sync().await.unwrap();
    let before = h.repo.get(&r.stream_id).await.unwrap();

    h.ledger.pin_view(old);
    let err = h.reconciler.sync().await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(h.repo.get(&r.stream_id).await.unwrap(), before);
    assert_eq!(h.reconciler.last_accepted_seq(), Some(2));
}

#[tokio::test]
async fn record_view_older_than_local_version_is_lagging() {
    let h = harness().await;
    let r = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T + 3_600))
        .unwrap();
    let old = h.ledger.query_streams().await.unwrap();

    // Local replica already applied a later on-chain cancel.
    let cancel = h.ledger.cancel_out_of_band(&r.stream_id).unwrap();
    let mut local = Stream::from_remote(&h.ledger.remote(&r.stream_id).unwrap(), T);
    local.version = cancel.ledger_seq;
    h.repo.insert_new(local.clone()).await.unwrap();

    h.ledger.pin_view(old);
    let report = h.reconciler.sync().await.unwrap();

    assert_eq!(report.lagging, vec![r.stream_id.clone()]);
    assert_eq!(h.repo.get(&r.stream_id).await.unwrap(), local);
}

#[tokio::test]
async fn local_only_records_are_kept_then_flagged() {
    let h = harness().await;
    h.repo.insert_new(local_only("local-1", T)).await.unwrap();

    let report = h.reconciler.sync().await.unwrap();
    assert_eq!(report.pending_local, vec!["local-1".to_string()]);
    assert!(!report.has_flags());

    h.clock.advance(STALE_AFTER + 1);
    let report = h.reconciler.sync().await.unwrap();
    assert_eq!(report.stale_local, vec!["local-1".to_string()]);
    assert_eq!(h.repo.get("local-1").await.unwrap(), local_only("local-1", T));
}

#[tokio::test]
async fn transient_query_failure_changes_nothing() {
    let h = harness().await;
    h.ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T))
        .unwrap();
    h.ledger.fail_next_queries(1);

    let err = h.reconciler.sync().await.unwrap_err();
    assert!(err.is_transient());
    assert!(h.repo.is_empty().await);

    let report = h.reconciler.sync().await.unwrap();
    assert_eq!(report.inserted.len(), 1);
}

#[tokio::test]
async fn pass_waits_for_in_flight_transition_on_same_id() {
    let h = harness().await;
    let r = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T + 3_600))
        .unwrap();
    h.reconciler.sync().await.unwrap();
    h.ledger.cancel_out_of_band(&r.stream_id).unwrap();

    let guard = h.repo.lock(&r.stream_id).await.unwrap();
    let rec = h.reconciler.clone();
    let pass = tokio::spawn(async move { rec.sync().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pass.is_finished());
    assert_eq!(h.repo.get(&r.stream_id).await.unwrap().canceled_at, None);

    drop(guard);
    let report = pass.await.unwrap().unwrap();
    assert!(report.updated.contains_key(&r.stream_id));
}

#[tokio::test]
async fn record_breaking_domain_invariants_is_refused() {
    let h = harness().await;
    let good = h
        .ledger
        .create_out_of_band(create_op("GSENDER", "GRECIP", "USDC", 150, 86_400, T))
        .unwrap();
    h.reconciler.sync().await.unwrap();
    let stored_good = h.repo.get(&good.stream_id).await.unwrap();

    let mut corrupted = h.ledger.remote(&good.stream_id).unwrap();
    corrupted.ledger_seq += 1;
    corrupted.total_amount = Amount::from_units(-5).unwrap();
    let bad = RemoteStream {
        id: "bad".to_string(),
        sender: "GSENDER".to_string(),
        recipient: "GRECIP".to_string(),
        asset_code: "DOGE".to_string(),
        total_amount: Amount::from_units(-5).unwrap(),
        duration_seconds: 10,
        start_at: T,
        canceled_at: None,
        claimed_amount: Amount::ZERO,
        ledger_seq: good.ledger_seq + 1,
    };
    h.ledger.pin_view(StreamSnapshot {
        ledger_seq: good.ledger_seq + 1,
        streams: vec![bad, corrupted],
    });

    let report = h.reconciler.sync().await.unwrap();

    assert!(report.inserted.is_empty());
    assert!(report.updated.is_empty());
    assert_eq!(
        report.invalid_remote.keys().cloned().collect::<Vec<_>>(),
        vec!["bad".to_string(), good.stream_id.clone()]
    );
    assert!(report.has_flags());
    assert!(h.repo.get("bad").await.is_none());

    let kept = h.repo.get(&good.stream_id).await.unwrap();
    assert_eq!(kept, stored_good);
    let p = calculate_progress(&kept, T + 43_200);
    assert_eq!(p.released_amount, Amount::from_units(75).unwrap());
}
