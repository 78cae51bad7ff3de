//! # Lock Manager
//!
//! Short-TTL mutual-exclusion locks over the shared store. A lock is a
//! transient key holding a random token; acquisition is a conditional set
//! with expiry, retried with jitter until a hard wait bound. Release only
//! deletes the key while it still holds this acquisition's token, so a lock
//! that expired and was re-acquired elsewhere is never clobbered.

use crate::constants::LOCK_KEY_PREFIX;
use crate::error::{BatcherError, Result};
use crate::store::{StoreProvider, StoreService};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LockManager {
    store: StoreProvider,
    timeout: Duration,
    max_wait: Duration,
}

impl LockManager {
    pub fn new(store: StoreProvider, timeout: Duration, max_wait: Duration) -> Self {
        Self {
            store,
            timeout,
            max_wait,
        }
    }

    /// Execute `critical_section` under mutual exclusion against all other
    /// callers using the same `name`.
    ///
    /// Failing to acquire within the configured `max_wait` is fatal to the
    /// calling protocol step and is not retried here; callers decide
    /// whether to re-invoke the step.
    pub async fn with_lock<F, Fut, T>(&self, name: &str, critical_section: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let key = format!("{LOCK_KEY_PREFIX}{name}");
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();

        loop {
            if self.store.set_if_absent(&key, &token, self.timeout).await? {
                trace!(lock = %name, "Lock acquired");
                break;
            }

            if started.elapsed() > self.max_wait {
                return Err(BatcherError::LockTimeout(format!(
                    "failed to acquire lock '{name}' after {:?}",
                    self.max_wait
                )));
            }

            // Short randomized delay to spread contending acquirers.
            let jitter = Duration::from_micros(100 + fastrand::u64(..100));
            tokio::time::sleep(jitter).await;
        }

        let result = critical_section().await;
        self.release(name, &key, &token).await;
        result
    }

    async fn release(&self, name: &str, key: &str, token: &str) {
        match self.store.get(key).await {
            Ok(Some(current)) if current == token => {
                if let Err(e) = self.store.delete(key).await {
                    warn!(lock = %name, error = %e, "Failed to release lock");
                } else {
                    trace!(lock = %name, "Lock released");
                }
            }
            Ok(_) => {
                debug!(
                    lock = %name,
                    "Lock no longer held by this acquisition; leaving it alone"
                );
            }
            Err(e) => {
                warn!(lock = %name, error = %e, "Failed to read lock during release");
            }
        }
    }
}
