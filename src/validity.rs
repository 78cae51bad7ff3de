//! # Validity Flag
//!
//! A cooperative, cascading cancellation marker. Poisoning a batch does not
//! stop the engine from counting or dispatching — in-flight work consults
//! [`BatchEngine::is_valid`] itself and voluntarily no-ops.

use crate::batch::keys;
use crate::engine::BatchEngine;
use crate::error::Result;
use crate::store::StoreService;
use std::collections::HashSet;
use tracing::info;

impl BatchEngine {
    /// Poison a batch: every descendant consulting `is_valid` from now on
    /// sees `false`.
    pub async fn invalidate_all(&self, bid: &str) -> Result<()> {
        self.store()
            .set(
                &keys::invalidated_key(bid),
                "1",
                self.config().bid_expire_ttl,
            )
            .await?;
        info!(bid = %bid, "Batch invalidated");
        Ok(())
    }

    /// Whether a batch and all of its ancestors are still valid.
    pub async fn is_valid(&self, bid: &str) -> Result<bool> {
        let mut current = bid.to_string();
        let mut seen = HashSet::new();

        loop {
            if self.store().exists(&keys::invalidated_key(&current)).await? {
                return Ok(false);
            }
            if !seen.insert(current.clone()) {
                // Defensive stop on a malformed parent chain.
                return Ok(true);
            }

            let parent = self
                .store()
                .hash_get(&keys::bid_key(&current), "parent_bid")
                .await?
                .filter(|s| !s.is_empty());
            match parent {
                Some(parent) => current = parent,
                None => return Ok(true),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BatcherConfig;
    use crate::engine::BatchEngine;
    use crate::store::StoreProvider;

    fn engine() -> BatchEngine {
        BatchEngine::new(StoreProvider::memory(), BatcherConfig::default())
    }

    #[tokio::test]
    async fn test_fresh_batch_is_valid() {
        let engine = engine();
        assert!(engine.is_valid("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidation_marks_batch() {
        let engine = engine();
        engine.invalidate_all("b1").await.unwrap();
        assert!(!engine.is_valid("b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidation_cascades_to_descendants() {
        let engine = engine();

        let mut parent = engine.create_batch();
        parent.start().await.unwrap();
        let mut child = parent.child();
        child.start().await.unwrap();
        let mut grandchild = child.child();
        grandchild.start().await.unwrap();

        engine.invalidate_all(parent.bid()).await.unwrap();

        assert!(!engine.is_valid(parent.bid()).await.unwrap());
        assert!(!engine.is_valid(child.bid()).await.unwrap());
        assert!(!engine.is_valid(grandchild.bid()).await.unwrap());
    }

    #[tokio::test]
    async fn test_sibling_stays_valid() {
        let engine = engine();

        let mut parent = engine.create_batch();
        parent.start().await.unwrap();
        let mut child_a = parent.child();
        child_a.start().await.unwrap();
        let mut child_b = parent.child();
        child_b.start().await.unwrap();

        engine.invalidate_all(child_a.bid()).await.unwrap();

        assert!(!engine.is_valid(child_a.bid()).await.unwrap());
        assert!(engine.is_valid(child_b.bid()).await.unwrap());
        assert!(engine.is_valid(parent.bid()).await.unwrap());
    }
}
