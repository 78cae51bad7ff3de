//! # Batch Entity
//!
//! A [`Batch`] is the handle a caller uses to declare a group of work
//! items: register callbacks, open the declaration window with
//! [`Batch::start`], add items (buffered, with amortized counter flushes),
//! and close it with [`Batch::commit`]. Completion reporting and dispatch
//! live on [`BatchEngine`](crate::engine::BatchEngine); the handle is only
//! the declaration side.
//!
//! Child batches are opened explicitly from their parent handle
//! ([`Batch::child`]) — there is no ambient "current batch" state, so the
//! linkage stays correct across worker pools and async executors.

pub mod counter;
pub mod keys;
pub mod status;

pub use status::{BatchStatus, FinalStatusSnapshot};

use crate::callback::{CallbackEvent, CallbackRegistration};
use crate::engine::BatchEngine;
use crate::error::{BatcherError, Result};
use crate::store::{StoreOp, StoreService};
use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Generate an opaque batch id.
fn generate_bid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generate an opaque work-item id.
fn generate_jid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Declaration-side handle for one batch.
#[derive(Debug)]
pub struct Batch {
    engine: BatchEngine,
    bid: String,
    parent_bid: Option<String>,
    existing: bool,
    initialized: bool,
    started: bool,
    committed: bool,
    callback_batch: bool,
    created_at: f64,
    queued_jids: Vec<String>,
    pending_jids: Vec<String>,
    last_flush: Option<Instant>,
}

impl Batch {
    pub(crate) fn new(
        engine: BatchEngine,
        existing_bid: Option<String>,
        parent_bid: Option<String>,
    ) -> Self {
        let existing = existing_bid.as_deref().is_some_and(|bid| !bid.is_empty());
        let bid = existing_bid
            .filter(|bid| !bid.is_empty())
            .unwrap_or_else(generate_bid);

        Self {
            engine,
            bid,
            parent_bid,
            existing,
            initialized: existing,
            started: false,
            committed: false,
            callback_batch: false,
            created_at: Utc::now().timestamp_micros() as f64 / 1e6,
            queued_jids: Vec::new(),
            pending_jids: Vec::new(),
            last_flush: None,
        }
    }

    pub fn bid(&self) -> &str {
        &self.bid
    }

    pub fn parent_bid(&self) -> Option<&str> {
        self.parent_bid.as_deref()
    }

    pub fn created_at(&self) -> f64 {
        self.created_at
    }

    /// Open a child batch linked to this one. The link is registered in the
    /// store when the child starts.
    pub fn child(&self) -> Batch {
        Batch::new(self.engine.clone(), None, Some(self.bid.clone()))
    }

    /// Persist a human-readable description on the batch hash.
    pub async fn set_description(&mut self, description: &str) -> Result<()> {
        self.persist_attr("description", description).await
    }

    /// Persist the queue callback deliveries should be routed to.
    pub async fn set_callback_queue(&mut self, queue: &str) -> Result<()> {
        self.persist_attr("callback_queue", queue).await
    }

    /// Mark this batch as a callback batch: a synthetic batch whose work
    /// items are callback deliveries and whose completion runs finalize.
    pub(crate) async fn mark_callback_batch(&mut self) -> Result<()> {
        self.callback_batch = true;
        self.persist_attr("callback_batch", "true").await
    }

    /// Register a callback for `event`. Rejected once the batch has
    /// started.
    pub async fn on(
        &mut self,
        event: CallbackEvent,
        descriptor: impl Into<String>,
        options: Value,
    ) -> Result<()> {
        if self.started {
            return Err(BatcherError::BatchAlreadyStarted(self.bid.clone()));
        }

        let registration = CallbackRegistration {
            callback: descriptor.into(),
            opts: options,
        };
        let payload = serde_json::to_string(&registration)?;
        let callbacks_key = keys::callbacks_key(&self.bid, event);
        let ttl = self.engine.config().bid_expire_ttl;

        self.engine
            .store()
            .transaction(vec![
                StoreOp::SetAdd {
                    key: callbacks_key.clone(),
                    members: vec![payload],
                },
                StoreOp::Expire {
                    key: callbacks_key,
                    ttl,
                },
            ])
            .await?;

        debug!(
            bid = %self.bid,
            event = %event,
            descriptor = %registration.callback,
            "Callback registered"
        );
        Ok(())
    }

    /// Open the work-item declaration window. Persists the batch hash and,
    /// for a child batch, registers the parent link and increments the
    /// parent's child count.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(BatcherError::BatchAlreadyStarted(self.bid.clone()));
        }
        self.started = true;

        if !self.existing && !self.initialized {
            let bid_key = keys::bid_key(&self.bid);
            let ttl = self.engine.config().bid_expire_ttl;
            let mut ops = vec![
                StoreOp::HashSet {
                    key: bid_key.clone(),
                    field: "created_at".to_string(),
                    value: self.created_at.to_string(),
                },
                StoreOp::Expire {
                    key: bid_key.clone(),
                    ttl,
                },
            ];

            if let Some(parent) = &self.parent_bid {
                ops.push(StoreOp::HashSet {
                    key: bid_key,
                    field: "parent_bid".to_string(),
                    value: parent.clone(),
                });
                ops.push(StoreOp::HashIncrBy {
                    key: keys::bid_key(parent),
                    field: "children".to_string(),
                    delta: 1,
                });
                ops.push(StoreOp::Expire {
                    key: keys::bid_key(parent),
                    ttl,
                });
            }

            self.engine.store().transaction(ops).await?;
            self.initialized = true;

            info!(
                bid = %self.bid,
                parent_bid = self.parent_bid.as_deref(),
                "📦 Batch opened"
            );
        }

        Ok(())
    }

    /// Declare one work item with a generated id.
    pub async fn add_work_item(&mut self) -> Result<String> {
        let jid = generate_jid();
        self.add_work_item_with_id(&jid).await?;
        Ok(jid)
    }

    /// Declare one work item under a caller-supplied id (retried items
    /// reuse their id).
    pub async fn add_work_item_with_id(&mut self, jid: &str) -> Result<()> {
        if !self.started {
            return Err(BatcherError::BatchNotStarted(self.bid.clone()));
        }
        if self.committed {
            return Err(BatcherError::BatchAlreadyCommitted(self.bid.clone()));
        }

        self.queued_jids.push(jid.to_string());
        self.pending_jids.push(jid.to_string());

        if self.should_flush() {
            self.flush_registration().await?;
        }
        Ok(())
    }

    /// Close the declaration window: force the final counter flush, record
    /// the item ids, and resolve the batch immediately when it is empty.
    ///
    /// Returns the ids of every declared work item.
    pub async fn commit(&mut self) -> Result<Vec<String>> {
        if !self.started {
            return Err(BatcherError::BatchNotStarted(self.bid.clone()));
        }
        if self.committed {
            return Err(BatcherError::BatchAlreadyCommitted(self.bid.clone()));
        }
        self.committed = true;

        if self.queued_jids.is_empty() {
            self.commit_empty().await?;
            return Ok(Vec::new());
        }

        self.flush_registration().await?;

        let ttl = self.engine.config().bid_expire_ttl;
        let mut ops = Vec::new();
        if let Some(parent) = &self.parent_bid {
            ops.push(StoreOp::Expire {
                key: keys::bid_key(parent),
                ttl,
            });
        }
        ops.push(StoreOp::Expire {
            key: keys::bid_key(&self.bid),
            ttl,
        });
        ops.push(StoreOp::SetAdd {
            key: keys::jids_key(&self.bid),
            members: self.queued_jids.clone(),
        });
        ops.push(StoreOp::Expire {
            key: keys::jids_key(&self.bid),
            ttl,
        });
        self.engine.store().transaction(ops).await?;

        info!(
            bid = %self.bid,
            total = self.queued_jids.len(),
            "📦 Batch committed"
        );
        Ok(self.queued_jids.clone())
    }

    fn should_flush(&self) -> bool {
        let Some(interval) = self.engine.config().registration_flush_interval else {
            return false;
        };
        if interval.is_zero() || self.queued_jids.len() == 1 {
            return true;
        }
        match self.last_flush {
            Some(at) => at.elapsed() >= interval,
            None => true,
        }
    }

    async fn flush_registration(&mut self) -> Result<()> {
        if self.pending_jids.is_empty() {
            return Ok(());
        }

        let count = self.pending_jids.len() as i64;
        let ttl = self.engine.config().bid_expire_ttl;
        let bid_key = keys::bid_key(&self.bid);
        let mut ops = Vec::new();

        // The parent tracks deep totals but never deep pending: its own
        // pending reflects only its direct work items and propagated child
        // failures.
        if let Some(parent) = &self.parent_bid {
            ops.push(StoreOp::HashIncrBy {
                key: keys::bid_key(parent),
                field: "total".to_string(),
                delta: count,
            });
            ops.push(StoreOp::Expire {
                key: keys::bid_key(parent),
                ttl,
            });
        }
        ops.push(StoreOp::HashIncrBy {
            key: bid_key.clone(),
            field: "pending".to_string(),
            delta: count,
        });
        ops.push(StoreOp::HashIncrBy {
            key: bid_key.clone(),
            field: "total".to_string(),
            delta: count,
        });
        ops.push(StoreOp::Expire { key: bid_key, ttl });

        self.engine.store().transaction(ops).await?;
        self.pending_jids.clear();
        self.last_flush = Some(Instant::now());
        Ok(())
    }

    /// A batch committed with zero work items is immediately resolved.
    /// Counters are written directly — no reporter can exist yet, so the
    /// batch lock is unnecessary.
    async fn commit_empty(&mut self) -> Result<()> {
        let bid_key = keys::bid_key(&self.bid);
        let ttl = self.engine.config().bid_expire_ttl;
        let store = self.engine.store();

        let stored_parent = store
            .hash_get(&bid_key, "parent_bid")
            .await?
            .filter(|s| !s.is_empty())
            .or_else(|| self.parent_bid.clone());

        let mut ops = vec![
            StoreOp::HashSet {
                key: bid_key.clone(),
                field: "pending".to_string(),
                value: "0".to_string(),
            },
            StoreOp::HashSet {
                key: bid_key.clone(),
                field: "total".to_string(),
                value: "0".to_string(),
            },
            StoreOp::HashSet {
                key: bid_key.clone(),
                field: "done".to_string(),
                value: "0".to_string(),
            },
            StoreOp::Expire {
                key: bid_key.clone(),
                ttl,
            },
        ];
        if let Some(parent) = &stored_parent {
            ops.push(StoreOp::Expire {
                key: keys::bid_key(parent),
                ttl,
            });
        }
        store.transaction(ops).await?;

        let has_complete_callbacks = store
            .set_len(&keys::callbacks_key(&self.bid, CallbackEvent::Complete))
            .await?
            > 0;
        let has_success_callbacks = store
            .set_len(&keys::callbacks_key(&self.bid, CallbackEvent::Success))
            .await?
            > 0;

        // A vacuous batch is trivially complete and successful, but only
        // dispatch when someone is listening: registered callbacks, or a
        // parent whose sets need the propagation.
        if !(has_complete_callbacks || has_success_callbacks || stored_parent.is_some()) {
            return Ok(());
        }

        // Children may still be outstanding even with zero direct items;
        // their own completion re-triggers the parent later.
        let replies = store
            .transaction(vec![
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "children".to_string(),
                },
                StoreOp::SetCard {
                    key: keys::complete_key(&self.bid),
                },
                StoreOp::SetCard {
                    key: keys::success_key(&self.bid),
                },
            ])
            .await?;
        let children = replies[0].as_count()?;
        let children_complete = replies[1].as_int()?;
        let children_success = replies[2].as_int()?;

        info!(bid = %self.bid, children = children, "📦 Empty batch resolved at commit");

        if children == children_complete {
            self.engine
                .enqueue_callbacks(CallbackEvent::Complete, &self.bid)
                .await?;
        }
        if (has_success_callbacks || stored_parent.is_some()) && children == children_success {
            self.engine
                .enqueue_callbacks(CallbackEvent::Success, &self.bid)
                .await?;
        }
        Ok(())
    }

    async fn persist_attr(&self, attribute: &str, value: &str) -> Result<()> {
        let bid_key = keys::bid_key(&self.bid);
        let ttl = self.engine.config().bid_expire_ttl;
        self.engine
            .store()
            .transaction(vec![
                StoreOp::HashSet {
                    key: bid_key.clone(),
                    field: attribute.to_string(),
                    value: value.to_string(),
                },
                StoreOp::Expire { key: bid_key, ttl },
            ])
            .await?;
        Ok(())
    }
}
