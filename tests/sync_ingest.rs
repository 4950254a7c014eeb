use permview::sync_bridge::decode_batch;
use permview::{
    AccessLevel, CollectionChange, PermissionEntry, PermviewConfig, PermviewInstance,
    RefreshScheduler,
};
use permview::host::RefreshDriver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::LocalSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_commit_every_batch() {
    let db = PermviewInstance::open(PermviewConfig::default()).expect("open");
    let ingest = db.spawn_ingest(8).expect("ingest");

    let mut producers = Vec::new();
    for producer in 0..4 {
        let sender = ingest.sender();
        producers.push(tokio::spawn(async move {
            for i in 0..10 {
                let batch = vec![PermissionEntry::new(
                    format!("/p{producer}"),
                    format!("u{i}"),
                    AccessLevel::Read,
                    i,
                )];
                sender.send(batch).await.expect("send");
            }
        }));
    }
    for producer in producers {
        producer.await.expect("producer");
    }

    let summary = ingest.finish().await.expect("finish");
    assert_eq!(summary.batches, 40);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.last_version, Some(40));
    assert_eq!(db.store().read_latest().expect("latest").view().len(), 40);
}

#[tokio::test]
async fn decoded_payloads_flow_into_a_driven_collection() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let db = PermviewInstance::open(PermviewConfig::low_latency()).expect("open");
            let scheduler = RefreshScheduler::new();
            let admins = db
                .results(&scheduler)
                .expect("results")
                .filtered(permview::query::plan::prop("accessLevel").eq(AccessLevel::Admin))
                .expect("filtered");
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let _token = admins
                .subscribe(move |_, change: CollectionChange| sink.lock().push(change))
                .expect("subscribe");
            let driver = RefreshDriver::from_config(scheduler.clone(), db.config());

            let ingest = db.spawn_ingest(2).expect("ingest");
            let payload = br#"[
                {"path":"/vault","userId":"root","accessLevel":"admin","updatedAt":1},
                {"path":"/vault","userId":"guest","accessLevel":"read","updatedAt":1}
            ]"#;
            ingest
                .send(decode_batch(payload).expect("decode"))
                .await
                .expect("send");
            let summary = ingest.finish().await.expect("finish");
            assert_eq!(summary.last_version, Some(1));

            for _ in 0..500 {
                if admins.version().expect("version") == 1 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            driver.stop().await;

            let items = admins.items().expect("items");
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].user_id(), "root");
            assert!(seen.lock().first().is_some_and(CollectionChange::is_initial));
        })
        .await;
}
