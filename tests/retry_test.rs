//! Retry discipline: failed items stay pending, successful retries count
//! exactly once, and the final counters are independent of how many
//! failure/success cycles each item went through.

mod common;

use batcher_core::callback::CallbackEvent;
use common::test_engine;
use proptest::prelude::*;
use serde_json::json;

#[tokio::test]
async fn test_fail_then_success_counts_once() {
    let (engine, _store, channel) = test_engine();

    let mut batch = engine.create_batch();
    batch
        .on(CallbackEvent::Success, "retry#succeeded", json!({}))
        .await
        .unwrap();
    batch.start().await.unwrap();
    let jids = vec![
        batch.add_work_item().await.unwrap(),
        batch.add_work_item().await.unwrap(),
        batch.add_work_item().await.unwrap(),
    ];
    batch.commit().await.unwrap();

    engine.report_success(batch.bid(), &jids[0]).await.unwrap();
    engine.report_success(batch.bid(), &jids[1]).await.unwrap();

    // Third item fails three times before finally succeeding.
    for _ in 0..3 {
        engine.report_failure(batch.bid(), &jids[2]).await.unwrap();
    }
    let status = engine.status(batch.bid());
    assert_eq!(status.pending().await.unwrap(), 1);
    assert_eq!(status.failures().await.unwrap(), 1);

    engine.report_success(batch.bid(), &jids[2]).await.unwrap();

    assert_eq!(status.pending().await.unwrap(), 0);
    assert_eq!(status.done().await.unwrap(), 3);
    assert_eq!(status.failures().await.unwrap(), 0);
    assert_eq!(channel.count(batch.bid(), CallbackEvent::Success), 1);
}

#[tokio::test]
async fn test_failure_info_tracks_current_failures() {
    let (engine, _store, _channel) = test_engine();

    let mut batch = engine.create_batch();
    batch.start().await.unwrap();
    let a = batch.add_work_item().await.unwrap();
    let b = batch.add_work_item().await.unwrap();
    batch.commit().await.unwrap();

    engine.report_failure(batch.bid(), &a).await.unwrap();
    engine.report_failure(batch.bid(), &b).await.unwrap();

    let status = engine.status(batch.bid());
    let mut info = status.failure_info().await.unwrap();
    info.sort();
    let mut expected = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(info, expected);

    engine.report_success(batch.bid(), &a).await.unwrap();
    assert_eq!(status.failure_info().await.unwrap(), vec![b.clone()]);
}

#[tokio::test]
async fn test_repeated_failure_propagates_to_parent_once() {
    let (engine, _store, _channel) = test_engine();

    let mut parent = engine.create_batch();
    parent.start().await.unwrap();
    let parent_jid = parent.add_work_item().await.unwrap();
    parent.commit().await.unwrap();

    let mut child = parent.child();
    child.start().await.unwrap();
    let child_jid = child.add_work_item().await.unwrap();
    child.commit().await.unwrap();

    // Parent: one direct item pending, plus the child's total.
    let parent_status = engine.status(parent.bid());
    assert_eq!(parent_status.pending().await.unwrap(), 1);
    assert_eq!(parent_status.total().await.unwrap(), 2);

    engine.report_failure(child.bid(), &child_jid).await.unwrap();
    engine.report_failure(child.bid(), &child_jid).await.unwrap();
    engine.report_failure(child.bid(), &child_jid).await.unwrap();

    // One unresolved failed unit upward, not three.
    assert_eq!(parent_status.pending().await.unwrap(), 2);
    assert_eq!(parent_status.failures().await.unwrap(), 1);
    let _ = parent_jid;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However the failure/success cycles interleave, the final counters
    /// match "items that reached success" vs "items that did not".
    #[test]
    fn prop_retry_cycles_never_double_count(
        items in prop::collection::vec((0usize..3, any::<bool>()), 1..16)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (engine, _store, _channel) = test_engine();

            let mut batch = engine.create_batch();
            batch.start().await.unwrap();
            let mut jids = Vec::new();
            for _ in 0..items.len() {
                jids.push(batch.add_work_item().await.unwrap());
            }
            batch.commit().await.unwrap();

            for (jid, (failures, succeeds)) in jids.iter().zip(&items) {
                for _ in 0..*failures {
                    engine.report_failure(batch.bid(), jid).await.unwrap();
                }
                if *succeeds {
                    engine.report_success(batch.bid(), jid).await.unwrap();
                }
            }

            let succeeded = items.iter().filter(|(_, s)| *s).count() as i64;
            let still_failed = items.iter().filter(|(f, s)| *f > 0 && !s).count() as i64;
            let total = items.len() as i64;

            let status = engine.status(batch.bid());
            assert_eq!(status.total().await.unwrap(), total);
            assert_eq!(status.done().await.unwrap(), succeeded);
            assert_eq!(status.pending().await.unwrap(), total - succeeded);
            assert_eq!(status.failures().await.unwrap(), still_failed);
        });
    }
}
