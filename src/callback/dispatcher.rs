//! # Callback Dispatcher
//!
//! Idempotent, fire-once callback delivery. `enqueue_callbacks` may be
//! called any number of times from any number of concurrent contexts; the
//! per-(batch, event) lock serializes attempts, and the processed flag
//! (written to its own key with its own TTL) makes the decision stick even
//! after the batch's data is gone.
//!
//! Multiple callbacks for one event are coordinated through a *callback
//! batch*: a synthetic batch with one work item per delivery whose own
//! `complete` event runs the finalize step. One completion protocol,
//! applied recursively, instead of a second bookkeeping mechanism.

use crate::batch::keys;
use crate::callback::channel::{CallbackDelivery, DeliveryTag};
use crate::callback::finalize::FinalizeContext;
use crate::callback::{CallbackEvent, CallbackRegistration};
use crate::constants::FINALIZE_DESCRIPTOR;
use crate::engine::BatchEngine;
use crate::error::{BatcherError, Result};
use crate::logging;
use crate::store::{StoreOp, StoreService};
use futures::future::BoxFuture;
use tracing::{debug, info};

impl BatchEngine {
    /// Evaluate the completion condition for `(bid, event)` and, when it
    /// holds for the first time, deliver the registered callbacks.
    ///
    /// Safe to call repeatedly and concurrently. Returns
    /// [`BatcherError::CompletionConditionChanged`] when the condition that
    /// justified the call no longer holds under the lock — a detected
    /// race, surfaced so operators can tell it apart from the normal
    /// idempotent no-op.
    pub async fn enqueue_callbacks(&self, event: CallbackEvent, bid: &str) -> Result<()> {
        self.enqueue_callbacks_boxed(event, bid.to_string()).await
    }

    /// Boxed form so finalize can re-enter dispatch recursively (child
    /// completion chains into ancestor dispatch).
    pub(crate) fn enqueue_callbacks_boxed(
        &self,
        event: CallbackEvent,
        bid: String,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            info!(bid = %bid, event = %event, "📬 Enqueueing callbacks");

            let lock_name = keys::callback_lock_name(&bid, event);
            self.locks()
                .with_lock(&lock_name, || async {
                    self.dispatch_under_lock(event, &bid).await
                })
                .await
        })
    }

    async fn dispatch_under_lock(&self, event: CallbackEvent, bid: &str) -> Result<()> {
        let store = self.store();
        let processed_key = keys::processed_key(bid, event);

        if store.get(&processed_key).await?.as_deref() == Some("true") {
            debug!(bid = %bid, event = %event, "Callbacks already processed, skipping");
            return Ok(());
        }

        // Re-verify the completion condition under the lock: the state may
        // have moved between the triggering report and this acquisition.
        let bid_key = keys::bid_key(bid);
        let replies = store
            .transaction(vec![
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "pending".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "children".to_string(),
                },
                StoreOp::SetCard {
                    key: keys::complete_key(bid),
                },
                StoreOp::SetCard {
                    key: keys::success_key(bid),
                },
                StoreOp::SetCard {
                    key: keys::failed_key(bid),
                },
            ])
            .await?;

        let pending = replies[0].as_count()?;
        let children = replies[1].as_count()?;
        let children_complete = replies[2].as_int()?;
        let children_success = replies[3].as_int()?;
        let failed = replies[4].as_int()?;

        let condition_holds = match event {
            CallbackEvent::Complete => pending == failed && children == children_complete,
            CallbackEvent::Success => pending == 0 && children == children_success,
        };
        if !condition_holds {
            let resolved = match event {
                CallbackEvent::Complete => children_complete,
                CallbackEvent::Success => children_success,
            };
            return Err(BatcherError::CompletionConditionChanged {
                bid: bid.to_string(),
                event: event.as_str().to_string(),
                pending,
                failed,
                children,
                resolved,
            });
        }

        // Registrations and metadata. Every read tolerates a missing batch
        // hash: descriptors that survived batch-data expiry must still
        // fire.
        let callbacks_key = keys::callbacks_key(bid, event);
        let replies = store
            .transaction(vec![
                StoreOp::SetMembers {
                    key: callbacks_key.clone(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "callback_queue".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "parent_bid".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key,
                    field: "callback_batch".to_string(),
                },
            ])
            .await?;

        let raw_registrations = replies[0].as_members()?;
        let queue = replies[1].as_value()?.filter(|s| !s.is_empty());
        let parent_bid = replies[2].as_value()?.filter(|s| !s.is_empty());
        let is_callback_batch = replies[3].as_value()?.as_deref() == Some("true");

        let registrations: Vec<CallbackRegistration> = raw_registrations
            .iter()
            .map(|raw| serde_json::from_str(raw))
            .collect::<std::result::Result<_, _>>()?;

        // Resolve the channel before committing to the dispatch so a
        // misconfigured engine fails without burning the processed flag.
        let channel = if registrations.is_empty() || is_callback_batch {
            None
        } else {
            Some(self.channel()?)
        };

        // Mark the event processed immediately, before any delivery, so a
        // concurrent or later attempt can never double-fire, even after the
        // batch data itself is cleaned up.
        store
            .set(&processed_key, "true", self.config().callback_flag_ttl)
            .await?;

        logging::log_dispatch_operation(
            "CALLBACKS_PROCESSED",
            bid,
            event.as_str(),
            "FLAGGED",
            Some(&format!("registrations={}", registrations.len())),
        );

        if registrations.is_empty() {
            debug!(bid = %bid, event = %event, "No callbacks registered");
            // Finalize still runs for propagation, except on a callback
            // batch whose sole purpose was finalization.
            if !is_callback_batch {
                self.run_finalize(bid, event).await?;
            }
            return Ok(());
        }

        // Registrations are consumed on dispatch.
        store.delete(&callbacks_key).await?;

        if is_callback_batch {
            // The stored registration carries the originating batch and
            // event; run its finalize synchronously.
            let context = registrations
                .first()
                .and_then(|reg| serde_json::from_value::<FinalizeContext>(reg.opts.clone()).ok())
                .unwrap_or_else(|| FinalizeContext {
                    bid: bid.to_string(),
                    event,
                });
            debug!(
                callback_bid = %bid,
                bid = %context.bid,
                event = %context.event,
                "Callback batch complete, running finalize"
            );
            return self.run_finalize(&context.bid, context.event).await;
        }

        let channel = channel.ok_or(BatcherError::ChannelNotInstalled)?;
        let queue = queue.unwrap_or_else(|| self.config().default_callback_queue.clone());
        let snapshot = self.status(bid).snapshot().await?;

        if let [registration] = registrations.as_slice() {
            // A single callback needs no coordination batch: hand it to
            // the channel untracked and finalize directly.
            channel
                .deliver(CallbackDelivery {
                    descriptor: registration.callback.clone(),
                    event,
                    options: registration.opts.clone(),
                    bid: bid.to_string(),
                    parent_bid,
                    queue,
                    snapshot,
                    tag: None,
                })
                .await?;
            return self.run_finalize(bid, event).await;
        }

        // Several callbacks: track each delivery as a work item of a
        // callback batch so finalize runs only after all of them ran.
        let mut callback_batch = self.create_batch();
        callback_batch.mark_callback_batch().await?;
        let context = FinalizeContext {
            bid: bid.to_string(),
            event,
        };
        callback_batch
            .on(
                CallbackEvent::Complete,
                FINALIZE_DESCRIPTOR,
                serde_json::to_value(&context)?,
            )
            .await?;
        callback_batch.start().await?;

        let mut deliveries = Vec::with_capacity(registrations.len());
        for registration in &registrations {
            let item_id = callback_batch.add_work_item().await?;
            deliveries.push(CallbackDelivery {
                descriptor: registration.callback.clone(),
                event,
                options: registration.opts.clone(),
                bid: bid.to_string(),
                parent_bid: parent_bid.clone(),
                queue: queue.clone(),
                snapshot: snapshot.clone(),
                tag: Some(DeliveryTag {
                    batch_id: callback_batch.bid().to_string(),
                    item_id,
                }),
            });
        }
        callback_batch.commit().await?;

        debug!(
            bid = %bid,
            event = %event,
            callback_bid = %callback_batch.bid(),
            deliveries = deliveries.len(),
            "Created callback batch"
        );

        for delivery in deliveries {
            channel.deliver(delivery).await?;
        }
        Ok(())
    }
}
