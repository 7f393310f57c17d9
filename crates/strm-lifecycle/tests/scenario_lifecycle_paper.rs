use std::sync::Arc;
use std::time::Duration;

use strm_ledger::{GatewaySettings, LedgerGateway};
use strm_ledger_paper::{PaperLedger, SubmitFault};
use strm_lifecycle::{ErrorKind, LifecycleEngine, LifecyclePolicy, RemoteFailureKind};
use strm_schemas::{Amount, ManualClock, StreamEvent, StreamSpec, StreamStatus};
use strm_store::StreamRepository;
use tokio::sync::broadcast;

const T: i64 = 1_700_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    ledger: Arc<PaperLedger>,
    repo: Arc<StreamRepository>,
    engine: LifecycleEngine,
    events: broadcast::Receiver<StreamEvent>,
}

async fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(T));
    let ledger = Arc::new(PaperLedger::new("paper-contract", clock.clone()));
    let gateway = LedgerGateway::connect(
        ledger.clone(),
        GatewaySettings {
            request_timeout: Duration::from_secs(1),
            confirm_attempts: 2,
            confirm_backoff: Duration::from_millis(1),
        },
    )
    .await
    .unwrap();
    let repo = Arc::new(StreamRepository::new());
    let (tx, rx) = broadcast::channel(64);
    let engine = LifecycleEngine::new(
        repo.clone(),
        Arc::new(gateway),
        clock.clone(),
        LifecyclePolicy::new(["USDC"], 60),
        tx,
    );
    Harness {
        clock,
        ledger,
        repo,
        engine,
        events: rx,
    }
}

fn spec(start_at: Option<i64>) -> StreamSpec {
    StreamSpec {
        sender: "GSENDER".to_string(),
        recipient: "GRECIP".to_string(),
        asset_code: "USDC".to_string(),
        total_amount: Amount::from_units(150).unwrap(),
        duration_seconds: 86_400,
        start_at,
    }
}

#[tokio::test]
async fn create_records_ledger_id_and_publishes_created() {
    let mut h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();

    assert_eq!(s.id, "strm-000001");
    assert_eq!(s.start_at, T);
    assert_eq!(s.version, 1);
    assert_eq!(h.repo.get(&s.id).await.unwrap(), s);
    assert!(matches!(h.events.try_recv().unwrap(), StreamEvent::Created { .. }));
}

#[tokio::test]
async fn invalid_spec_never_reaches_the_ledger() {
    let h = harness().await;
    let mut bad = spec(None);
    bad.asset_code = "DOGE".into();

    let err = h.engine.create(&bad).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.ledger.submissions().is_empty());
    assert!(h.repo.is_empty().await);
}

#[tokio::test]
async fn rejected_create_leaves_no_local_record() {
    let h = harness().await;
    h.ledger.reject_next("INSUFFICIENT_BALANCE", "sender cannot fund stream");

    let err = h.engine.create(&spec(None)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RemoteFailure);
    assert_eq!(err.remote_kind(), Some(RemoteFailureKind::Rejected));
    assert!(h.repo.is_empty().await);
}

#[tokio::test]
async fn create_survives_a_timeout_after_commit() {
    let h = harness().await;
    h.ledger.inject(SubmitFault::TimeoutAfterCommit);

    let s = h.engine.create(&spec(None)).await.unwrap();
    assert_eq!(h.ledger.submit_count("create"), 1, "no duplicate submit");
    assert_eq!(h.repo.get(&s.id).await.unwrap().id, s.id);
}

#[tokio::test]
async fn create_lost_before_commit_is_a_transient_failure() {
    let h = harness().await;
    h.ledger.inject(SubmitFault::TimeoutBeforeCommit);

    let err = h.engine.create(&spec(None)).await.unwrap_err();
    assert!(err.is_transient());
    assert!(h.repo.is_empty().await);
    assert_eq!(h.ledger.ledger_seq(), 0);
}

#[tokio::test]
async fn cancel_twice_is_idempotent_with_one_submit_and_one_event() {
    let mut h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();
    let _ = h.events.try_recv();

    h.clock.advance(100);
    let first = h.engine.cancel(&s.id).await.unwrap();
    h.clock.advance(100);
    let second = h.engine.cancel(&s.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.canceled_at, Some(T + 100));
    assert_eq!(h.ledger.submit_count("cancel"), 1);
    assert!(matches!(h.events.try_recv().unwrap(), StreamEvent::Canceled { .. }));
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn cancel_after_completion_is_a_conflict_and_changes_nothing() {
    let h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();
    h.clock.advance(86_400);

    let err = h.engine.cancel(&s.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.repo.get(&s.id).await.unwrap(), s);
    assert_eq!(h.ledger.submit_count("cancel"), 0);
}

#[tokio::test]
async fn failed_cancel_leaves_record_untouched() {
    let h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();
    h.ledger.reject_next("AUTH", "bad signature");

    let err = h.engine.cancel(&s.id).await.unwrap_err();
    assert_eq!(err.remote_kind(), Some(RemoteFailureKind::Rejected));
    assert_eq!(h.repo.get(&s.id).await.unwrap().canceled_at, None);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let h = harness().await;
    assert_eq!(
        h.engine.cancel("strm-999999").await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn reschedule_only_while_scheduled() {
    let h = harness().await;
    let s = h.engine.create(&spec(Some(T + 600))).await.unwrap();

    let moved = h.engine.reschedule(&s.id, T + 1_200).await.unwrap();
    assert_eq!(moved.start_at, T + 1_200);

    let err = h.engine.reschedule(&s.id, T).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation, "new start must be in the future");

    h.clock.set(T + 1_300);
    let err = h.engine.reschedule(&s.id, T + 5_000).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.repo.get(&s.id).await.unwrap().start_at, T + 1_200);
}

#[tokio::test]
async fn claims_accumulate_up_to_released() {
    let h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();
    h.clock.advance(43_200);

    let after = h
        .engine
        .claim(&s.id, Amount::from_units(50).unwrap())
        .await
        .unwrap();
    assert_eq!(after.claimed_amount, Amount::from_units(50).unwrap());

    let err = h
        .engine
        .claim(&s.id, Amount::from_units(26).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    h.engine
        .claim(&s.id, Amount::from_units(25).unwrap())
        .await
        .unwrap();
    assert_eq!(
        h.ledger.remote(&s.id).unwrap().claimed_amount,
        Amount::from_units(75).unwrap()
    );
}

#[tokio::test]
async fn canceled_stream_still_allows_claiming_what_was_released() {
    let h = harness().await;
    let s = h.engine.create(&spec(None)).await.unwrap();
    h.clock.advance(43_200);
    h.engine.cancel(&s.id).await.unwrap();
    h.clock.advance(10_000);

    let s = h
        .engine
        .claim(&s.id, Amount::from_units(75).unwrap())
        .await
        .unwrap();
    assert_eq!(
        strm_progress::calculate_progress(&s, h.clock_now()).status,
        StreamStatus::Canceled
    );
}

impl Harness {
    fn clock_now(&self) -> i64 {
        use strm_schemas::Clock;
        self.clock.now()
    }
}
