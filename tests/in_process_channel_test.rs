//! The bundled in-process channel: descriptor resolution through the
//! registry, spawned-task invocation, and acknowledgement of tracked
//! deliveries — including the failure path for an unresolvable descriptor.

use async_trait::async_trait;
use batcher_core::batch::FinalStatusSnapshot;
use batcher_core::callback::{BatchCallback, CallbackEvent, CallbackRegistry};
use batcher_core::config::BatcherConfig;
use batcher_core::engine::BatchEngine;
use batcher_core::error::Result;
use batcher_core::store::StoreProvider;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingCallback {
    complete_calls: AtomicUsize,
    success_calls: AtomicUsize,
}

#[async_trait]
impl BatchCallback for CountingCallback {
    async fn on_complete(&self, status: &FinalStatusSnapshot, _options: &Value) -> Result<()> {
        assert!(status.is_complete());
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_success(&self, status: &FinalStatusSnapshot, _options: &Value) -> Result<()> {
        assert!(status.is_success());
        self.success_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {description}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_invoked_once_per_event() {
    let registry = Arc::new(CallbackRegistry::new());
    let audit = Arc::new(CountingCallback::default());
    let mail = Arc::new(CountingCallback::default());
    registry.register("audit#done", audit.clone());
    registry.register("mail#done", mail.clone());

    let engine = BatchEngine::with_registry(
        StoreProvider::memory(),
        BatcherConfig::default(),
        registry,
    );
    engine.install_in_process_channel().unwrap();

    let mut batch = engine.create_batch();
    for descriptor in ["audit#done", "mail#done"] {
        batch
            .on(CallbackEvent::Complete, descriptor, json!({}))
            .await
            .unwrap();
        batch
            .on(CallbackEvent::Success, descriptor, json!({}))
            .await
            .unwrap();
    }
    batch.start().await.unwrap();
    let jid = batch.add_work_item().await.unwrap();
    batch.commit().await.unwrap();

    engine.report_success(batch.bid(), &jid).await.unwrap();

    wait_until("all handlers to run", || {
        audit.complete_calls.load(Ordering::SeqCst) == 1
            && mail.complete_calls.load(Ordering::SeqCst) == 1
            && audit.success_calls.load(Ordering::SeqCst) == 1
            && mail.success_calls.load(Ordering::SeqCst) == 1
    })
    .await;

    // Settled: no late duplicate invocations.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(audit.complete_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mail.complete_calls.load(Ordering::SeqCst), 1);
    assert_eq!(audit.success_calls.load(Ordering::SeqCst), 1);
    assert_eq!(mail.success_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unresolvable_descriptor_fails_its_delivery_only() {
    let registry = Arc::new(CallbackRegistry::new());
    let known = Arc::new(CountingCallback::default());
    registry.register("known#done", known.clone());

    let engine = BatchEngine::with_registry(
        StoreProvider::memory(),
        BatcherConfig::default(),
        registry,
    );
    engine.install_in_process_channel().unwrap();

    let mut batch = engine.create_batch();
    batch
        .on(CallbackEvent::Complete, "known#done", json!({}))
        .await
        .unwrap();
    batch
        .on(CallbackEvent::Complete, "ghost#gone", json!({}))
        .await
        .unwrap();
    batch.start().await.unwrap();
    let jid = batch.add_work_item().await.unwrap();
    batch.commit().await.unwrap();

    engine.report_success(batch.bid(), &jid).await.unwrap();

    wait_until("the known handler to run", || {
        known.complete_calls.load(Ordering::SeqCst) == 1
    })
    .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(known.complete_calls.load(Ordering::SeqCst), 1);
}
