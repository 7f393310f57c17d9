//! Scenario: concurrent callers share one repository and one gateway.

use std::collections::BTreeSet;

use strm_testkit::{SpecBuilder, TestBed};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_unique_ids() {
    let bed = TestBed::start().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let svc = bed.service.clone();
        tasks.push(tokio::spawn(async move {
            let spec = SpecBuilder::new().recipient(&format!("GRECIP{i}")).build();
            svc.create_stream(&spec).await.unwrap().id
        }));
    }
    let mut ids = BTreeSet::new();
    for t in tasks {
        ids.insert(t.await.unwrap());
    }

    assert_eq!(ids.len(), 20);
    let listed: Vec<String> = bed
        .service
        .list_streams(None)
        .await
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(listed, ids.into_iter().collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_cancels_submit_once_and_agree() {
    let bed = TestBed::start().await.unwrap();
    let s = bed
        .service
        .create_stream(&SpecBuilder::new().build())
        .await
        .unwrap();
    bed.clock.advance(500);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let svc = bed.service.clone();
        let id = s.id.clone();
        tasks.push(tokio::spawn(async move {
            svc.cancel_stream(&id).await.unwrap().unwrap()
        }));
    }
    let mut snapshots = Vec::new();
    for t in tasks {
        snapshots.push(t.await.unwrap());
    }

    assert_eq!(bed.ledger.submit_count("cancel"), 1);
    assert!(snapshots.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sync_interleaved_with_mutations_loses_nothing() {
    let bed = TestBed::start().await.unwrap();
    let mut ids = Vec::new();
    for i in 0..5 {
        let spec = SpecBuilder::new().recipient(&format!("GR{i}")).build();
        ids.push(bed.service.create_stream(&spec).await.unwrap().id);
    }
    bed.clock.advance(100);

    let syncer = {
        let svc = bed.service.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                let _ = svc.sync_all().await;
            }
        })
    };
    let mut cancels = Vec::new();
    for id in ids.clone() {
        let svc = bed.service.clone();
        cancels.push(tokio::spawn(async move { svc.cancel_stream(&id).await }));
    }
    for c in cancels {
        c.await.unwrap().unwrap();
    }
    syncer.await.unwrap();

    bed.service.sync_all().await.unwrap();
    for id in ids {
        let local = bed.service.get_stream(&id).await.unwrap();
        let remote = bed.ledger.remote(&id).unwrap();
        assert!(local.canceled_at.is_some());
        assert_eq!(local.canceled_at, remote.canceled_at);
    }
}
