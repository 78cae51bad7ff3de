//! Store service trait definition

use super::errors::{StoreError, StoreResult};
use std::time::Duration;

/// One write or read inside an atomic multi-operation transaction.
///
/// Mirrors the subset of store commands the batch protocol uses; a
/// transaction's operations are applied together with no interleaving from
/// other clients.
#[derive(Debug, Clone)]
pub enum StoreOp {
    HashSet {
        key: String,
        field: String,
        value: String,
    },
    HashIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    HashGet {
        key: String,
        field: String,
    },
    SetAdd {
        key: String,
        members: Vec<String>,
    },
    SetRemove {
        key: String,
        members: Vec<String>,
    },
    SetCard {
        key: String,
    },
    SetMembers {
        key: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Delete {
        key: String,
    },
}

/// Reply for one [`StoreOp`], in submission order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    /// Counter-style replies: incremented value, cardinality, added/removed
    /// counts, expire/delete results.
    Int(i64),
    /// `HashGet` replies.
    Value(Option<String>),
    /// `SetMembers` replies.
    Members(Vec<String>),
}

impl StoreReply {
    pub fn as_int(&self) -> StoreResult<i64> {
        match self {
            StoreReply::Int(n) => Ok(*n),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected integer reply, got {other:?}"
            ))),
        }
    }

    pub fn as_value(&self) -> StoreResult<Option<String>> {
        match self {
            StoreReply::Value(v) => Ok(v.clone()),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected value reply, got {other:?}"
            ))),
        }
    }

    /// Interpret a reply as a counter: integers pass through, absent hash
    /// fields count as zero, present fields must parse as integers.
    pub fn as_count(&self) -> StoreResult<i64> {
        match self {
            StoreReply::Int(n) => Ok(*n),
            StoreReply::Value(None) => Ok(0),
            StoreReply::Value(Some(s)) => s.parse::<i64>().map_err(|e| {
                StoreError::UnexpectedReply(format!("non-numeric counter field '{s}': {e}"))
            }),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected counter reply, got {other:?}"
            ))),
        }
    }

    pub fn as_members(&self) -> StoreResult<Vec<String>> {
        match self {
            StoreReply::Members(m) => Ok(m.clone()),
            other => Err(StoreError::UnexpectedReply(format!(
                "expected members reply, got {other:?}"
            ))),
        }
    }
}

/// Trait defining the shared store operations the batch protocol needs.
///
/// Implemented by concrete store providers (Redis, in-memory). All
/// operations are async and return `StoreResult` for error handling.
pub trait StoreService: Send + Sync {
    /// Get a scalar value by key
    fn get(&self, key: &str) -> impl std::future::Future<Output = StoreResult<Option<String>>> + Send;

    /// Set a scalar value with a TTL
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Set a scalar value with a TTL only if the key does not exist.
    ///
    /// Returns `Ok(true)` when the value was written.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Delete a key
    fn delete(&self, key: &str) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Whether a key currently exists
    fn exists(&self, key: &str) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Read one hash field
    fn hash_get(
        &self,
        key: &str,
        field: &str,
    ) -> impl std::future::Future<Output = StoreResult<Option<String>>> + Send;

    /// Cardinality of a set (zero when absent)
    fn set_len(&self, key: &str) -> impl std::future::Future<Output = StoreResult<i64>> + Send;

    /// All members of a set (empty when absent)
    fn set_members(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = StoreResult<Vec<String>>> + Send;

    /// Apply a sequence of operations atomically and return one reply per
    /// operation, in order.
    fn transaction(
        &self,
        ops: Vec<StoreOp>,
    ) -> impl std::future::Future<Output = StoreResult<Vec<StoreReply>>> + Send;

    /// Check if the store backend is healthy
    fn health_check(&self) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Get the name of the store provider
    fn provider_name(&self) -> &'static str;
}
