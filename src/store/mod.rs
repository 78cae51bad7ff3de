//! # Shared Store Layer
//!
//! Narrow async interface over the shared key-value store the batch
//! protocol coordinates through: atomic hash increments, set operations,
//! conditional sets with expiry, and multi-operation transactions.
//!
//! The store is the single source of truth; no component caches
//! authoritative counts across calls. Two providers are included:
//!
//! - [`RedisStoreService`] for production deployments
//! - [`InMemoryStoreService`] for tests and single-process embeddings

pub mod errors;
pub mod memory;
pub mod provider;
pub mod redis;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryStoreService;
pub use provider::StoreProvider;
pub use self::redis::RedisStoreService;
pub use traits::{StoreOp, StoreReply, StoreService};
