//! # Batch Status Views
//!
//! Two ways of looking at a batch's state: [`BatchStatus`] reads the live
//! counters from the store on every call, and [`FinalStatusSnapshot`] is
//! the immutable capture handed to callbacks — it stays valid and
//! inspectable after the live batch data has expired.

use crate::batch::keys;
use crate::error::Result;
use crate::store::{StoreOp, StoreProvider, StoreReply, StoreService};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live, per-field view over a batch's persisted state.
#[derive(Debug, Clone)]
pub struct BatchStatus {
    store: StoreProvider,
    bid: String,
}

impl BatchStatus {
    pub(crate) fn new(store: StoreProvider, bid: String) -> Self {
        Self { store, bid }
    }

    pub fn bid(&self) -> &str {
        &self.bid
    }

    /// Whether the batch hash still exists in the store.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.store.exists(&keys::bid_key(&self.bid)).await?)
    }

    pub async fn pending(&self) -> Result<i64> {
        self.counter_field("pending").await
    }

    pub async fn total(&self) -> Result<i64> {
        self.counter_field("total").await
    }

    pub async fn done(&self) -> Result<i64> {
        self.counter_field("done").await
    }

    pub async fn child_count(&self) -> Result<i64> {
        self.counter_field("children").await
    }

    /// Read a single counter field from the batch hash, interpreting an
    /// absent field as zero (same semantics as [`StoreReply::as_count`]).
    async fn counter_field(&self, field: &str) -> Result<i64> {
        let raw = self
            .store
            .hash_get(&keys::bid_key(&self.bid), field)
            .await?;
        Ok(StoreReply::Value(raw).as_count()?)
    }

    pub async fn failures(&self) -> Result<i64> {
        Ok(self.store.set_len(&keys::failed_key(&self.bid)).await?)
    }

    /// Ids of work items currently in failed state.
    pub async fn failure_info(&self) -> Result<Vec<String>> {
        Ok(self.store.set_members(&keys::failed_key(&self.bid)).await?)
    }

    pub async fn created_at(&self) -> Result<Option<f64>> {
        let raw = self
            .store
            .hash_get(&keys::bid_key(&self.bid), "created_at")
            .await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    pub async fn parent_bid(&self) -> Result<Option<String>> {
        let raw = self
            .store
            .hash_get(&keys::bid_key(&self.bid), "parent_bid")
            .await?;
        Ok(raw.filter(|s| !s.is_empty()))
    }

    /// Capture an immutable snapshot of the batch's current state.
    ///
    /// All fields are read in one store transaction so the snapshot is
    /// internally consistent.
    pub async fn snapshot(&self) -> Result<FinalStatusSnapshot> {
        let bid_key = keys::bid_key(&self.bid);
        let replies = self
            .store
            .transaction(vec![
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "pending".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "total".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "done".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "children".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "created_at".to_string(),
                },
                StoreOp::HashGet {
                    key: bid_key.clone(),
                    field: "parent_bid".to_string(),
                },
                StoreOp::SetCard {
                    key: keys::failed_key(&self.bid),
                },
                StoreOp::SetMembers {
                    key: keys::failed_key(&self.bid),
                },
                StoreOp::SetCard {
                    key: keys::complete_key(&self.bid),
                },
                StoreOp::SetCard {
                    key: keys::success_key(&self.bid),
                },
            ])
            .await?;

        let pending = replies[0].as_count()?;
        let total = replies[1].as_count()?;
        let done = replies[2].as_count()?;
        let child_count = replies[3].as_count()?;
        let created_at = replies[4].as_value()?.and_then(|s| s.parse().ok());
        let parent_bid = replies[5].as_value()?.filter(|s| !s.is_empty());
        let failures = replies[6].as_int()?;
        let failure_info = replies[7].as_members()?;
        let children_complete = replies[8].as_int()?;
        let children_success = replies[9].as_int()?;

        Ok(FinalStatusSnapshot {
            bid: self.bid.clone(),
            total,
            pending,
            done,
            failures,
            failure_info,
            created_at,
            parent_bid,
            child_count,
            complete: pending == failures && child_count == children_complete,
            success: pending == 0 && child_count == children_success,
            captured_at: Utc::now(),
        })
    }
}

/// Immutable batch status captured at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStatusSnapshot {
    pub bid: String,
    pub total: i64,
    pub pending: i64,
    pub done: i64,
    pub failures: i64,
    pub failure_info: Vec<String>,
    pub created_at: Option<f64>,
    pub parent_bid: Option<String>,
    pub child_count: i64,
    pub complete: bool,
    pub success: bool,
    pub captured_at: DateTime<Utc>,
}

impl FinalStatusSnapshot {
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Serialize for handoff across process boundaries.
    pub fn serialized(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FinalStatusSnapshot {
        FinalStatusSnapshot {
            bid: "b1".to_string(),
            total: 100,
            pending: 10,
            done: 90,
            failures: 10,
            failure_info: vec!["j1".to_string(), "j2".to_string()],
            created_at: Some(1_722_000_000.25),
            parent_bid: None,
            child_count: 0,
            complete: true,
            success: false,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_serialization_round_trip() {
        let snapshot = sample();
        let raw = snapshot.serialized().unwrap();
        let back = FinalStatusSnapshot::deserialize(&raw).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_snapshot_flags() {
        let snapshot = sample();
        assert!(snapshot.is_complete());
        assert!(!snapshot.is_success());
    }
}
