//! # System Constants
//!
//! Centralized constants for batch data layout and lifecycle defaults.
//! Key layouts here are the wire contract with any other process speaking
//! the same protocol against the shared store; changing them is a breaking
//! change for mixed deployments.

use std::time::Duration;

/// TTL applied to every batch data key (hash, jid/failed sets, callback
/// registrations). Batches are never deleted explicitly; they age out.
/// 30 days.
pub const BID_EXPIRE_TTL: Duration = Duration::from_secs(2_592_000);

/// TTL for per-event processed flags. Stored under a separate key from the
/// batch data so idempotency survives batch-data expiry. 24 hours.
pub const CALLBACK_FLAG_TTL: Duration = Duration::from_secs(86_400);

/// Queue name used for callback deliveries when a batch does not set one.
pub const DEFAULT_CALLBACK_QUEUE: &str = "default";

/// Default TTL for a named lock key. A protocol step that outlives this
/// loses mutual exclusion, so it is deliberately generous relative to the
/// store round-trips a step performs.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound on waiting for a contended lock before the calling
/// protocol step fails.
pub const DEFAULT_LOCK_MAX_WAIT: Duration = Duration::from_secs(60);

/// Prefix for batch hash and per-batch set keys.
pub const BID_KEY_PREFIX: &str = "BID-";

/// Prefix for lock keys.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Prefix for validity (poison) markers.
pub const INVALIDATED_KEY_PREFIX: &str = "invalidated-bid-";

/// Reserved callback descriptor naming the internal finalize step. A
/// callback batch registers this against its own `complete` event; the
/// dispatcher resolves it inline instead of going through the registry.
pub const FINALIZE_DESCRIPTOR: &str = "batcher::finalize#dispatch";
