//! # Batch Counter Protocol
//!
//! Success/failure reporting for individual work items. Every report holds
//! the batch's named lock for the entire read-modify-decide sequence,
//! never just the final write, so the decision to dispatch callbacks can
//! never race ahead of a concurrent counter update.
//!
//! Retry discipline: a failed item stays `pending` until it is reported
//! successful. The success path removes the id from the failed set in the
//! same transaction that decrements `pending`, so however many
//! failure/success cycles an item goes through, it is decremented exactly
//! once.

use crate::batch::keys;
use crate::callback::CallbackEvent;
use crate::engine::BatchEngine;
use crate::error::Result;
use crate::logging;
use crate::store::{StoreOp, StoreService};
use tracing::debug;

impl BatchEngine {
    /// Record one work item's successful resolution and dispatch callbacks
    /// when this report satisfies a completion condition.
    ///
    /// Safe for retried items: if `item_id` previously failed, this clears
    /// the failure and performs the single pending decrement for it.
    pub async fn report_success(&self, bid: &str, item_id: &str) -> Result<()> {
        let lock_name = keys::batch_lock_name(bid);
        self.locks()
            .with_lock(&lock_name, || async {
                let bid_key = keys::bid_key(bid);
                let ttl = self.config().bid_expire_ttl;

                let replies = self
                    .store()
                    .transaction(vec![
                        StoreOp::SetCard {
                            key: keys::failed_key(bid),
                        },
                        StoreOp::HashIncrBy {
                            key: bid_key.clone(),
                            field: "pending".to_string(),
                            delta: -1,
                        },
                        StoreOp::HashIncrBy {
                            key: bid_key.clone(),
                            field: "done".to_string(),
                            delta: 1,
                        },
                        StoreOp::HashIncrBy {
                            key: bid_key.clone(),
                            field: "children".to_string(),
                            delta: 0,
                        },
                        StoreOp::SetCard {
                            key: keys::complete_key(bid),
                        },
                        StoreOp::SetCard {
                            key: keys::success_key(bid),
                        },
                        StoreOp::HashGet {
                            key: bid_key.clone(),
                            field: "total".to_string(),
                        },
                        StoreOp::HashGet {
                            key: bid_key.clone(),
                            field: "parent_bid".to_string(),
                        },
                        StoreOp::SetRemove {
                            key: keys::failed_key(bid),
                            members: vec![item_id.to_string()],
                        },
                        StoreOp::SetRemove {
                            key: keys::jids_key(bid),
                            members: vec![item_id.to_string()],
                        },
                        StoreOp::Expire {
                            key: bid_key.clone(),
                            ttl,
                        },
                    ])
                    .await?;

                let failed = replies[0].as_int()?;
                let pending = replies[1].as_int()?;
                let done = replies[2].as_int()?;
                let children = replies[3].as_int()?;
                let children_complete = replies[4].as_int()?;
                let children_success = replies[5].as_int()?;
                let total = replies[6].as_count()?;
                let parent_bid = replies[7].as_value()?.filter(|s| !s.is_empty());
                let cleared_failure = replies[8].as_int()? > 0;

                // The card was taken before the removal, so a retried item
                // still counts in `failed` here; correct for the decision.
                let failed = if cleared_failure { failed - 1 } else { failed };

                // Undo the one pending, failed unit this id propagated
                // into the parent when it first failed.
                if cleared_failure {
                    if let Some(parent) = &parent_bid {
                        self.store()
                            .transaction(vec![
                                StoreOp::HashIncrBy {
                                    key: keys::bid_key(parent),
                                    field: "pending".to_string(),
                                    delta: -1,
                                },
                                StoreOp::SetRemove {
                                    key: keys::failed_key(parent),
                                    members: vec![item_id.to_string()],
                                },
                            ])
                            .await?;
                    }
                }

                debug!(
                    bid = %bid,
                    jid = %item_id,
                    pending = pending,
                    done = done,
                    failed = failed,
                    total = total,
                    "🟢 Work item succeeded"
                );

                let all_success = pending == 0 && children == children_success;
                if (pending == failed && children == children_complete) || all_success {
                    logging::log_batch_operation(
                        "BATCH_RESOLVED",
                        bid,
                        Some(pending),
                        Some(done),
                        Some(failed),
                        None,
                    );
                    self.enqueue_callbacks(CallbackEvent::Complete, bid).await?;
                    if all_success {
                        self.enqueue_callbacks(CallbackEvent::Success, bid).await?;
                    }
                }

                Ok(())
            })
            .await
    }

    /// Record one work item's failure. The item stays pending until a
    /// retry succeeds; the first failure of an id is propagated to the
    /// parent batch as one unresolved, failed unit.
    pub async fn report_failure(&self, bid: &str, item_id: &str) -> Result<()> {
        let lock_name = keys::batch_lock_name(bid);
        self.locks()
            .with_lock(&lock_name, || async {
                let bid_key = keys::bid_key(bid);
                let ttl = self.config().bid_expire_ttl;

                let replies = self
                    .store()
                    .transaction(vec![
                        StoreOp::SetAdd {
                            key: keys::failed_key(bid),
                            members: vec![item_id.to_string()],
                        },
                        StoreOp::HashIncrBy {
                            key: bid_key.clone(),
                            field: "pending".to_string(),
                            delta: 0,
                        },
                        StoreOp::SetCard {
                            key: keys::failed_key(bid),
                        },
                        StoreOp::HashIncrBy {
                            key: bid_key,
                            field: "children".to_string(),
                            delta: 0,
                        },
                        StoreOp::SetCard {
                            key: keys::complete_key(bid),
                        },
                        StoreOp::HashGet {
                            key: keys::bid_key(bid),
                            field: "parent_bid".to_string(),
                        },
                        StoreOp::Expire {
                            key: keys::failed_key(bid),
                            ttl,
                        },
                    ])
                    .await?;

                let newly_failed = replies[0].as_int()? > 0;
                let pending = replies[1].as_int()?;
                let failed = replies[2].as_int()?;
                let children = replies[3].as_int()?;
                let children_complete = replies[4].as_int()?;
                let parent_bid = replies[5].as_value()?.filter(|s| !s.is_empty());

                // An unresolved failure in a child blocks every ancestor:
                // surface it in the parent as one pending, failed unit.
                // Only on the first failure of this id, so repeated retry
                // failures don't double-count upward.
                if newly_failed {
                    if let Some(parent) = &parent_bid {
                        self.store()
                            .transaction(vec![
                                StoreOp::HashIncrBy {
                                    key: keys::bid_key(parent),
                                    field: "pending".to_string(),
                                    delta: 1,
                                },
                                StoreOp::SetAdd {
                                    key: keys::failed_key(parent),
                                    members: vec![item_id.to_string()],
                                },
                                StoreOp::Expire {
                                    key: keys::failed_key(parent),
                                    ttl,
                                },
                            ])
                            .await?;
                    }
                }

                debug!(
                    bid = %bid,
                    jid = %item_id,
                    pending = pending,
                    failed = failed,
                    parent_bid = parent_bid.as_deref(),
                    "🔴 Work item failed"
                );

                if pending == failed && children == children_complete {
                    self.enqueue_callbacks(CallbackEvent::Complete, bid).await?;
                }

                Ok(())
            })
            .await
    }
}
