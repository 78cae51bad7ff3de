//! # Finalize Step
//!
//! Runs after an event's callbacks are delivered (or immediately when none
//! are registered). Finalize is where hierarchy propagation happens: a
//! finished child records itself in its parent's `complete`/`success` sets
//! and re-evaluates the ancestor conditions that recording may have
//! satisfied, chaining dispatch up the tree.

use crate::batch::keys;
use crate::callback::CallbackEvent;
use crate::engine::BatchEngine;
use crate::error::Result;
use crate::store::{StoreOp, StoreService};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Originating batch and event a finalize run acts for. Carried through a
/// callback batch's registration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FinalizeContext {
    pub bid: String,
    pub event: CallbackEvent,
}

impl BatchEngine {
    pub(crate) async fn run_finalize(&self, bid: &str, event: CallbackEvent) -> Result<()> {
        debug!(bid = %bid, event = %event, "Finalizing");

        let parent_bid = self
            .store()
            .hash_get(&keys::bid_key(bid), "parent_bid")
            .await?
            .filter(|s| !s.is_empty());

        match event {
            CallbackEvent::Complete => self.finalize_complete(bid, parent_bid).await,
            CallbackEvent::Success => self.finalize_success(bid, parent_bid).await,
        }
    }

    /// A batch completed: record it in the parent's `complete` set, fire
    /// the batch's own `success` if everything resolved successfully, and
    /// re-check whether the parent just became complete (a child that
    /// completes with failures is otherwise never reflected upward).
    async fn finalize_complete(&self, bid: &str, parent_bid: Option<String>) -> Result<()> {
        let ttl = self.config().bid_expire_ttl;
        let mut ops = Vec::new();
        if let Some(parent) = &parent_bid {
            ops.push(StoreOp::SetAdd {
                key: keys::complete_key(parent),
                members: vec![bid.to_string()],
            });
            ops.push(StoreOp::Expire {
                key: keys::complete_key(parent),
                ttl,
            });
        }
        ops.push(StoreOp::HashIncrBy {
            key: keys::bid_key(bid),
            field: "pending".to_string(),
            delta: 0,
        });
        ops.push(StoreOp::HashIncrBy {
            key: keys::bid_key(bid),
            field: "children".to_string(),
            delta: 0,
        });
        ops.push(StoreOp::SetCard {
            key: keys::success_key(bid),
        });

        let replies = self.store().transaction(ops).await?;
        let offset = if parent_bid.is_some() { 2 } else { 0 };
        let pending = replies[offset].as_int()?;
        let children = replies[offset + 1].as_int()?;
        let children_success = replies[offset + 2].as_int()?;

        if pending == 0 && children == children_success {
            self.enqueue_callbacks_boxed(CallbackEvent::Success, bid.to_string())
                .await?;
        }

        if let Some(parent) = parent_bid {
            let replies = self
                .store()
                .transaction(vec![
                    StoreOp::HashIncrBy {
                        key: keys::bid_key(&parent),
                        field: "pending".to_string(),
                        delta: 0,
                    },
                    StoreOp::SetCard {
                        key: keys::failed_key(&parent),
                    },
                    StoreOp::HashIncrBy {
                        key: keys::bid_key(&parent),
                        field: "children".to_string(),
                        delta: 0,
                    },
                    StoreOp::SetCard {
                        key: keys::complete_key(&parent),
                    },
                ])
                .await?;

            let parent_pending = replies[0].as_int()?;
            let parent_failed = replies[1].as_int()?;
            let parent_children = replies[2].as_int()?;
            let parent_complete = replies[3].as_int()?;

            if parent_pending == parent_failed && parent_children == parent_complete {
                self.enqueue_callbacks_boxed(CallbackEvent::Complete, parent)
                    .await?;
            }
        }

        Ok(())
    }

    /// A batch fully succeeded: record it in the parent's `success` set
    /// and fire the parent's `complete` if this was its last unresolved
    /// child.
    async fn finalize_success(&self, bid: &str, parent_bid: Option<String>) -> Result<()> {
        let Some(parent) = parent_bid else {
            return Ok(());
        };

        let ttl = self.config().bid_expire_ttl;
        let replies = self
            .store()
            .transaction(vec![
                StoreOp::SetAdd {
                    key: keys::success_key(&parent),
                    members: vec![bid.to_string()],
                },
                StoreOp::Expire {
                    key: keys::success_key(&parent),
                    ttl,
                },
                StoreOp::SetCard {
                    key: keys::complete_key(&parent),
                },
                StoreOp::HashIncrBy {
                    key: keys::bid_key(&parent),
                    field: "pending".to_string(),
                    delta: 0,
                },
                StoreOp::HashIncrBy {
                    key: keys::bid_key(&parent),
                    field: "children".to_string(),
                    delta: 0,
                },
                StoreOp::SetCard {
                    key: keys::failed_key(&parent),
                },
                StoreOp::SetCard {
                    key: keys::success_key(&parent),
                },
            ])
            .await?;

        let parent_complete = replies[2].as_int()?;
        let parent_pending = replies[3].as_int()?;
        let parent_children = replies[4].as_int()?;
        let parent_failed = replies[5].as_int()?;
        let parent_success = replies[6].as_int()?;

        if parent_complete == parent_children && parent_pending == parent_failed {
            self.enqueue_callbacks_boxed(CallbackEvent::Complete, parent.clone())
                .await?;
        }
        // A recovered hierarchy can become fully successful long after the
        // parent completed; this is the only place that can notice.
        if parent_pending == 0 && parent_children == parent_success {
            self.enqueue_callbacks_boxed(CallbackEvent::Success, parent)
                .await?;
        }

        Ok(())
    }
}
