//! Store provider with enum dispatch
//!
//! Uses enum dispatch for zero-cost abstraction over the configured
//! backend. Consumers hold a `StoreProvider` and stay oblivious to which
//! backend is in play.

use super::errors::StoreResult;
use super::memory::InMemoryStoreService;
use super::redis::RedisStoreService;
use super::traits::{StoreOp, StoreReply, StoreService};
use crate::config::BatcherConfig;
use std::time::Duration;
use tracing::info;

/// Configured store backend
#[derive(Debug, Clone)]
pub enum StoreProvider {
    /// Redis store provider (boxed to reduce enum size)
    Redis(Box<RedisStoreService>),
    /// Process-local store provider
    Memory(InMemoryStoreService),
}

impl StoreProvider {
    /// Connect the Redis backend named by the configuration
    pub async fn from_config(config: &BatcherConfig) -> StoreResult<Self> {
        let service = RedisStoreService::connect(&config.store_url).await?;
        info!(provider = "redis", "Store provider initialized");
        Ok(Self::Redis(Box::new(service)))
    }

    /// Process-local backend for tests and single-process embeddings
    pub fn memory() -> Self {
        Self::Memory(InMemoryStoreService::new())
    }
}

impl StoreService for StoreProvider {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self {
            Self::Redis(s) => s.get(key).await,
            Self::Memory(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        match self {
            Self::Redis(s) => s.set(key, value, ttl).await,
            Self::Memory(s) => s.set(key, value, ttl).await,
        }
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        match self {
            Self::Redis(s) => s.set_if_absent(key, value, ttl).await,
            Self::Memory(s) => s.set_if_absent(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        match self {
            Self::Redis(s) => s.delete(key).await,
            Self::Memory(s) => s.delete(key).await,
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self {
            Self::Redis(s) => s.exists(key).await,
            Self::Memory(s) => s.exists(key).await,
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match self {
            Self::Redis(s) => s.hash_get(key, field).await,
            Self::Memory(s) => s.hash_get(key, field).await,
        }
    }

    async fn set_len(&self, key: &str) -> StoreResult<i64> {
        match self {
            Self::Redis(s) => s.set_len(key).await,
            Self::Memory(s) => s.set_len(key).await,
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        match self {
            Self::Redis(s) => s.set_members(key).await,
            Self::Memory(s) => s.set_members(key).await,
        }
    }

    async fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Vec<StoreReply>> {
        match self {
            Self::Redis(s) => s.transaction(ops).await,
            Self::Memory(s) => s.transaction(ops).await,
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        match self {
            Self::Redis(s) => s.health_check().await,
            Self::Memory(s) => s.health_check().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            Self::Redis(s) => s.provider_name(),
            Self::Memory(s) => s.provider_name(),
        }
    }
}
