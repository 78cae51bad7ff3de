//! Shared helpers for integration tests: an engine over the in-memory
//! store and a recording channel that acknowledges tracked deliveries
//! inline, so tests observe deterministic dispatch.
#![allow(dead_code)]

use async_trait::async_trait;
use batcher_core::callback::{CallbackChannel, CallbackDelivery, CallbackEvent};
use batcher_core::config::BatcherConfig;
use batcher_core::engine::BatchEngine;
use batcher_core::error::Result;
use batcher_core::store::StoreProvider;
use parking_lot::Mutex;
use std::sync::Arc;

/// Channel that records every delivery and, when tracked, immediately
/// reports the delivery's work item as succeeded.
pub struct RecordingChannel {
    engine: Mutex<Option<BatchEngine>>,
    deliveries: Mutex<Vec<CallbackDelivery>>,
    ack: bool,
}

impl RecordingChannel {
    fn new(ack: bool) -> Arc<Self> {
        Arc::new(Self {
            engine: Mutex::new(None),
            deliveries: Mutex::new(Vec::new()),
            ack,
        })
    }

    pub fn deliveries(&self) -> Vec<CallbackDelivery> {
        self.deliveries.lock().clone()
    }

    /// Deliveries for a given batch and event.
    pub fn for_event(&self, bid: &str, event: CallbackEvent) -> Vec<CallbackDelivery> {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.bid == bid && d.event == event)
            .cloned()
            .collect()
    }

    pub fn count(&self, bid: &str, event: CallbackEvent) -> usize {
        self.for_event(bid, event).len()
    }
}

#[async_trait]
impl CallbackChannel for RecordingChannel {
    async fn deliver(&self, delivery: CallbackDelivery) -> Result<()> {
        self.deliveries.lock().push(delivery.clone());

        if self.ack {
            if let Some(tag) = &delivery.tag {
                let engine = self
                    .engine
                    .lock()
                    .clone()
                    .expect("recording channel used before wiring");
                engine.report_success(&tag.batch_id, &tag.item_id).await?;
            }
        }
        Ok(())
    }
}

/// Engine over a fresh in-memory store, with a recording channel installed.
pub fn test_engine() -> (BatchEngine, StoreProvider, Arc<RecordingChannel>) {
    let store = StoreProvider::memory();
    let engine = BatchEngine::new(store.clone(), BatcherConfig::default());
    let channel = RecordingChannel::new(true);
    *channel.engine.lock() = Some(engine.clone());
    engine
        .install_channel(channel.clone())
        .expect("fresh engine accepts a channel");
    (engine, store, channel)
}

/// Engine with no channel installed, for misconfiguration tests.
pub fn bare_engine() -> (BatchEngine, StoreProvider) {
    let store = StoreProvider::memory();
    let engine = BatchEngine::new(store.clone(), BatcherConfig::default());
    (engine, store)
}

/// Install a recording channel on a bare engine.
pub fn install_recording_channel(engine: &BatchEngine) -> Arc<RecordingChannel> {
    let channel = RecordingChannel::new(true);
    *channel.engine.lock() = Some(engine.clone());
    engine
        .install_channel(channel.clone())
        .expect("engine accepts a channel");
    channel
}
