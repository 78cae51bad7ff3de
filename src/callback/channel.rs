//! # Callback Invocation Channel
//!
//! The boundary between the dispatch protocol and whatever actually runs
//! user callbacks. The channel must invoke the named callback
//! asynchronously, at least once; the dispatcher's processed flag turns
//! that into effectively-once from the batch's perspective.
//!
//! Tracked deliveries (those belonging to a callback batch) carry a
//! [`DeliveryTag`] the channel acknowledges back into the engine once the
//! callback ran, exactly as an executed work item reports its own
//! completion.

use crate::batch::status::FinalStatusSnapshot;
use crate::callback::CallbackEvent;
use crate::engine::{BatchEngine, EngineInner};
use crate::error::{BatcherError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Weak;
use tracing::{debug, error};

/// Work-item identity a tracked delivery must acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTag {
    pub batch_id: String,
    pub item_id: String,
}

/// One callback delivery handed to the invocation channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackDelivery {
    pub descriptor: String,
    pub event: CallbackEvent,
    pub options: Value,
    /// Batch the event fired on.
    pub bid: String,
    pub parent_bid: Option<String>,
    /// Queue hint for channels that route deliveries through a job system.
    pub queue: String,
    /// Immutable status captured at dispatch time; stays inspectable after
    /// the live batch data expires.
    pub snapshot: FinalStatusSnapshot,
    /// Present when the delivery is a work item of a callback batch.
    pub tag: Option<DeliveryTag>,
}

/// Asynchronous, at-least-once callback invocation.
#[async_trait]
pub trait CallbackChannel: Send + Sync {
    async fn deliver(&self, delivery: CallbackDelivery) -> Result<()>;
}

/// In-process channel: resolves descriptors against the engine's registry
/// and runs each delivery on a spawned task.
pub struct InProcessChannel {
    inner: Weak<EngineInner>,
}

impl InProcessChannel {
    pub fn new(engine: &BatchEngine) -> Self {
        Self {
            inner: engine.downgrade(),
        }
    }
}

#[async_trait]
impl CallbackChannel for InProcessChannel {
    async fn deliver(&self, delivery: CallbackDelivery) -> Result<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(BatcherError::CallbackError(
                "engine is no longer running".to_string(),
            ));
        };
        let engine = BatchEngine::from_inner(inner);

        debug!(
            descriptor = %delivery.descriptor,
            bid = %delivery.bid,
            event = %delivery.event,
            tracked = delivery.tag.is_some(),
            "Spawning callback delivery"
        );

        tokio::spawn(async move {
            let outcome = invoke_registered_callback(&engine, &delivery).await;
            if let Err(error) = &outcome {
                error!(
                    descriptor = %delivery.descriptor,
                    bid = %delivery.bid,
                    event = %delivery.event,
                    error = %error,
                    "Callback invocation failed"
                );
            }

            if let Some(tag) = &delivery.tag {
                let report = match &outcome {
                    Ok(()) => engine.report_success(&tag.batch_id, &tag.item_id).await,
                    Err(_) => engine.report_failure(&tag.batch_id, &tag.item_id).await,
                };
                if let Err(error) = report {
                    error!(
                        batch_id = %tag.batch_id,
                        item_id = %tag.item_id,
                        error = %error,
                        "Failed to acknowledge callback delivery"
                    );
                }
            }
        });

        Ok(())
    }
}

/// Resolve a delivery's descriptor and run the matching hook.
pub async fn invoke_registered_callback(
    engine: &BatchEngine,
    delivery: &CallbackDelivery,
) -> Result<()> {
    let handler = engine
        .registry()
        .resolve(&delivery.descriptor)
        .ok_or_else(|| BatcherError::UnknownCallback(delivery.descriptor.clone()))?;

    match delivery.event {
        CallbackEvent::Complete => handler.on_complete(&delivery.snapshot, &delivery.options).await,
        CallbackEvent::Success => handler.on_success(&delivery.snapshot, &delivery.options).await,
    }
}
