//! Runtime configuration for the batch engine.
//!
//! Plain struct with environment overrides. The TTL and lock defaults come
//! from [`crate::constants`]; everything can be tuned per deployment.

use crate::constants;
use crate::error::{BatcherError, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Connection URL for the shared store (Redis provider only).
    pub store_url: String,
    /// TTL placed on every lock key at acquisition.
    pub lock_timeout: Duration,
    /// Hard bound on waiting for a contended lock.
    pub lock_max_wait: Duration,
    /// TTL for batch data keys.
    pub bid_expire_ttl: Duration,
    /// TTL for per-event processed flags.
    pub callback_flag_ttl: Duration,
    /// When set, work-item registration flushes counter increments to the
    /// store incrementally at this interval instead of only at commit.
    /// `Some(Duration::ZERO)` flushes on every item.
    pub registration_flush_interval: Option<Duration>,
    /// Queue name attached to callback deliveries when the batch sets none.
    pub default_callback_queue: String,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            store_url: "redis://localhost:6379".to_string(),
            lock_timeout: constants::DEFAULT_LOCK_TIMEOUT,
            lock_max_wait: constants::DEFAULT_LOCK_MAX_WAIT,
            bid_expire_ttl: constants::BID_EXPIRE_TTL,
            callback_flag_ttl: constants::CALLBACK_FLAG_TTL,
            registration_flush_interval: None,
            default_callback_queue: constants::DEFAULT_CALLBACK_QUEUE.to_string(),
        }
    }
}

impl BatcherConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BATCHER_STORE_URL").or_else(|_| std::env::var("REDIS_URL"))
        {
            config.store_url = url;
        }

        if let Ok(ms) = std::env::var("BATCHER_LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms.parse().map_err(|e| {
                BatcherError::ConfigurationError(format!("Invalid lock_timeout_ms: {e}"))
            })?);
        }

        if let Ok(ms) = std::env::var("BATCHER_LOCK_MAX_WAIT_MS") {
            config.lock_max_wait = Duration::from_millis(ms.parse().map_err(|e| {
                BatcherError::ConfigurationError(format!("Invalid lock_max_wait_ms: {e}"))
            })?);
        }

        if let Ok(secs) = std::env::var("BATCHER_BID_EXPIRE_TTL_SECS") {
            config.bid_expire_ttl = Duration::from_secs(secs.parse().map_err(|e| {
                BatcherError::ConfigurationError(format!("Invalid bid_expire_ttl_secs: {e}"))
            })?);
        }

        if let Ok(ms) = std::env::var("BATCHER_REGISTRATION_FLUSH_INTERVAL_MS") {
            config.registration_flush_interval =
                Some(Duration::from_millis(ms.parse().map_err(|e| {
                    BatcherError::ConfigurationError(format!(
                        "Invalid registration_flush_interval_ms: {e}"
                    ))
                })?));
        }

        if let Ok(queue) = std::env::var("BATCHER_DEFAULT_CALLBACK_QUEUE") {
            config.default_callback_queue = queue;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BatcherConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.lock_max_wait, Duration::from_secs(60));
        assert_eq!(config.default_callback_queue, "default");
        assert!(config.registration_flush_interval.is_none());
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        std::env::set_var("BATCHER_LOCK_TIMEOUT_MS", "not-a-number");
        let result = BatcherConfig::from_env();
        std::env::remove_var("BATCHER_LOCK_TIMEOUT_MS");
        assert!(matches!(
            result,
            Err(BatcherError::ConfigurationError(_))
        ));
    }
}
