//! In-memory store provider
//!
//! A process-local implementation with the same semantics as the Redis
//! provider: typed keys, lazy TTL expiry, and transactions applied under a
//! single lock so no other caller observes a partial update. Backs unit and
//! integration tests; also usable for single-process deployments.

use crate::store::errors::{StoreError, StoreResult};
use crate::store::traits::{StoreOp, StoreReply, StoreService};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Stored {
    Scalar(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    data: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

type Keyspace = HashMap<String, Entry>;

/// Process-local store service
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoreService {
    keys: Arc<Mutex<Keyspace>>,
}

impl InMemoryStoreService {
    pub fn new() -> Self {
        Self::default()
    }
}

fn live_entry<'a>(keys: &'a mut Keyspace, key: &str) -> Option<&'a mut Entry> {
    if keys.get(key).is_some_and(Entry::expired) {
        keys.remove(key);
    }
    keys.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::BackendError(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

fn hash_entry<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<&'a mut HashMap<String, String>> {
    let entry = keys.entry(key.to_string()).or_insert_with(|| Entry {
        data: Stored::Hash(HashMap::new()),
        expires_at: None,
    });
    match &mut entry.data {
        Stored::Hash(hash) => Ok(hash),
        _ => Err(wrong_type(key)),
    }
}

fn set_entry<'a>(keys: &'a mut Keyspace, key: &str) -> StoreResult<&'a mut HashSet<String>> {
    let entry = keys.entry(key.to_string()).or_insert_with(|| Entry {
        data: Stored::Set(HashSet::new()),
        expires_at: None,
    });
    match &mut entry.data {
        Stored::Set(set) => Ok(set),
        _ => Err(wrong_type(key)),
    }
}

fn apply_op(keys: &mut Keyspace, op: &StoreOp) -> StoreResult<StoreReply> {
    match op {
        StoreOp::HashSet { key, field, value } => {
            let _ = live_entry(keys, key);
            let hash = hash_entry(keys, key)?;
            let created = i64::from(!hash.contains_key(field));
            hash.insert(field.clone(), value.clone());
            Ok(StoreReply::Int(created))
        }
        StoreOp::HashIncrBy { key, field, delta } => {
            let _ = live_entry(keys, key);
            let hash = hash_entry(keys, key)?;
            let current = match hash.get(field) {
                Some(raw) => raw.parse::<i64>().map_err(|e| {
                    StoreError::BackendError(format!("hash field '{field}' is not an integer: {e}"))
                })?,
                None => 0,
            };
            let next = current + delta;
            hash.insert(field.clone(), next.to_string());
            Ok(StoreReply::Int(next))
        }
        StoreOp::HashGet { key, field } => match live_entry(keys, key) {
            Some(entry) => match &entry.data {
                Stored::Hash(hash) => Ok(StoreReply::Value(hash.get(field).cloned())),
                _ => Err(wrong_type(key)),
            },
            None => Ok(StoreReply::Value(None)),
        },
        StoreOp::SetAdd { key, members } => {
            let _ = live_entry(keys, key);
            let set = set_entry(keys, key)?;
            let mut added = 0;
            for member in members {
                if set.insert(member.clone()) {
                    added += 1;
                }
            }
            Ok(StoreReply::Int(added))
        }
        StoreOp::SetRemove { key, members } => match live_entry(keys, key) {
            Some(entry) => match &mut entry.data {
                Stored::Set(set) => {
                    let mut removed = 0;
                    for member in members {
                        if set.remove(member) {
                            removed += 1;
                        }
                    }
                    Ok(StoreReply::Int(removed))
                }
                _ => Err(wrong_type(key)),
            },
            None => Ok(StoreReply::Int(0)),
        },
        StoreOp::SetCard { key } => match live_entry(keys, key) {
            Some(entry) => match &entry.data {
                Stored::Set(set) => Ok(StoreReply::Int(set.len() as i64)),
                _ => Err(wrong_type(key)),
            },
            None => Ok(StoreReply::Int(0)),
        },
        StoreOp::SetMembers { key } => match live_entry(keys, key) {
            Some(entry) => match &entry.data {
                Stored::Set(set) => {
                    let mut members: Vec<String> = set.iter().cloned().collect();
                    members.sort();
                    Ok(StoreReply::Members(members))
                }
                _ => Err(wrong_type(key)),
            },
            None => Ok(StoreReply::Members(Vec::new())),
        },
        StoreOp::Expire { key, ttl } => match live_entry(keys, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + *ttl);
                Ok(StoreReply::Int(1))
            }
            None => Ok(StoreReply::Int(0)),
        },
        StoreOp::Delete { key } => {
            let existed = live_entry(keys, key).is_some();
            keys.remove(key);
            Ok(StoreReply::Int(i64::from(existed)))
        }
    }
}

impl StoreService for InMemoryStoreService {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        match live_entry(&mut keys, key) {
            Some(entry) => match &entry.data {
                Stored::Scalar(value) => Ok(Some(value.clone())),
                _ => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut keys = self.keys.lock();
        keys.insert(
            key.to_string(),
            Entry {
                data: Stored::Scalar(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        if live_entry(&mut keys, key).is_some() {
            return Ok(false);
        }
        keys.insert(
            key.to_string(),
            Entry {
                data: Stored::Scalar(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.keys.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut keys = self.keys.lock();
        Ok(live_entry(&mut keys, key).is_some())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut keys = self.keys.lock();
        apply_op(
            &mut keys,
            &StoreOp::HashGet {
                key: key.to_string(),
                field: field.to_string(),
            },
        )?
        .as_value()
    }

    async fn set_len(&self, key: &str) -> StoreResult<i64> {
        let mut keys = self.keys.lock();
        apply_op(&mut keys, &StoreOp::SetCard { key: key.to_string() })?.as_int()
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut keys = self.keys.lock();
        apply_op(&mut keys, &StoreOp::SetMembers { key: key.to_string() })?.as_members()
    }

    async fn transaction(&self, ops: Vec<StoreOp>) -> StoreResult<Vec<StoreReply>> {
        let mut keys = self.keys.lock();
        ops.iter().map(|op| apply_op(&mut keys, op)).collect()
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_ops() {
        tokio_test::block_on(async {
            let store = InMemoryStoreService::new();
            assert_eq!(store.get("missing").await.unwrap(), None);

            store.set("k", "v", Duration::from_secs(60)).await.unwrap();
            assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
            assert!(store.exists("k").await.unwrap());

            store.delete("k").await.unwrap();
            assert!(!store.exists("k").await.unwrap());
        });
    }

    #[test]
    fn test_set_if_absent_respects_existing() {
        tokio_test::block_on(async {
            let store = InMemoryStoreService::new();
            assert!(store.set_if_absent("lock", "a", Duration::from_secs(60)).await.unwrap());
            assert!(!store.set_if_absent("lock", "b", Duration::from_secs(60)).await.unwrap());
            assert_eq!(store.get("lock").await.unwrap(), Some("a".to_string()));
        });
    }

    #[test]
    fn test_expired_key_is_absent() {
        tokio_test::block_on(async {
            let store = InMemoryStoreService::new();
            store.set("k", "v", Duration::from_nanos(1)).await.unwrap();
            std::thread::sleep(Duration::from_millis(5));
            assert_eq!(store.get("k").await.unwrap(), None);
            // Expiry frees the key for a conditional set.
            assert!(store.set_if_absent("k", "w", Duration::from_secs(60)).await.unwrap());
        });
    }

    #[test]
    fn test_hash_and_set_transaction() {
        tokio_test::block_on(async {
            let store = InMemoryStoreService::new();
            let replies = store
                .transaction(vec![
                    StoreOp::HashIncrBy {
                        key: "b".into(),
                        field: "pending".into(),
                        delta: 5,
                    },
                    StoreOp::HashIncrBy {
                        key: "b".into(),
                        field: "pending".into(),
                        delta: -2,
                    },
                    StoreOp::SetAdd {
                        key: "b-failed".into(),
                        members: vec!["j1".into(), "j2".into(), "j1".into()],
                    },
                    StoreOp::SetCard { key: "b-failed".into() },
                    StoreOp::SetRemove {
                        key: "b-failed".into(),
                        members: vec!["j1".into(), "jx".into()],
                    },
                    StoreOp::HashGet {
                        key: "b".into(),
                        field: "pending".into(),
                    },
                    StoreOp::HashGet {
                        key: "b".into(),
                        field: "absent".into(),
                    },
                ])
                .await
                .unwrap();

            assert_eq!(replies[0], StoreReply::Int(5));
            assert_eq!(replies[1], StoreReply::Int(3));
            assert_eq!(replies[2], StoreReply::Int(2));
            assert_eq!(replies[3], StoreReply::Int(2));
            assert_eq!(replies[4], StoreReply::Int(1));
            assert_eq!(replies[5], StoreReply::Value(Some("3".to_string())));
            assert_eq!(replies[6], StoreReply::Value(None));
        });
    }

    #[test]
    fn test_wrong_type_is_surfaced() {
        tokio_test::block_on(async {
            let store = InMemoryStoreService::new();
            store.set("k", "v", Duration::from_secs(60)).await.unwrap();
            let result = store.set_len("k").await;
            assert!(matches!(result, Err(StoreError::BackendError(_))));
        });
    }

    #[test]
    fn test_counter_reply_helper() {
        assert_eq!(StoreReply::Int(4).as_count().unwrap(), 4);
        assert_eq!(StoreReply::Value(None).as_count().unwrap(), 0);
        assert_eq!(StoreReply::Value(Some("17".into())).as_count().unwrap(), 17);
        assert!(StoreReply::Value(Some("x".into())).as_count().is_err());
    }
}
