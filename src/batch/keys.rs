//! Store key layout for batch data.
//!
//! These names are the wire contract: every process coordinating on the
//! same store must agree on them.

use crate::callback::CallbackEvent;
use crate::constants::{BID_KEY_PREFIX, INVALIDATED_KEY_PREFIX};

/// Hash of counters and metadata for a batch.
pub fn bid_key(bid: &str) -> String {
    format!("{BID_KEY_PREFIX}{bid}")
}

/// Set of work-item ids currently in failed state.
pub fn failed_key(bid: &str) -> String {
    format!("{BID_KEY_PREFIX}{bid}-failed")
}

/// Set of all work-item ids ever registered.
pub fn jids_key(bid: &str) -> String {
    format!("{BID_KEY_PREFIX}{bid}-jids")
}

/// Set of child bids that reached the complete condition.
pub fn complete_key(bid: &str) -> String {
    format!("{BID_KEY_PREFIX}{bid}-complete")
}

/// Set of child bids that reached the success condition.
pub fn success_key(bid: &str) -> String {
    format!("{BID_KEY_PREFIX}{bid}-success")
}

/// Set of serialized callback registrations for an event.
pub fn callbacks_key(bid: &str, event: CallbackEvent) -> String {
    format!("{BID_KEY_PREFIX}{bid}-callbacks-{event}")
}

/// Idempotency flag for a (batch, event) pair. Separate key with its own
/// TTL so it survives batch-data expiry.
pub fn processed_key(bid: &str, event: CallbackEvent) -> String {
    format!("{BID_KEY_PREFIX}{bid}-processed-{event}")
}

/// Poison marker consulted by `is_valid`.
pub fn invalidated_key(bid: &str) -> String {
    format!("{INVALIDATED_KEY_PREFIX}{bid}")
}

/// Lock serializing counter mutations for one batch.
pub fn batch_lock_name(bid: &str) -> String {
    format!("batch-lock-{bid}")
}

/// Lock serializing dispatch attempts for one (batch, event) pair.
pub fn callback_lock_name(bid: &str, event: CallbackEvent) -> String {
    format!("callback-lock-{bid}-{event}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(bid_key("abc"), "BID-abc");
        assert_eq!(failed_key("abc"), "BID-abc-failed");
        assert_eq!(jids_key("abc"), "BID-abc-jids");
        assert_eq!(complete_key("abc"), "BID-abc-complete");
        assert_eq!(success_key("abc"), "BID-abc-success");
        assert_eq!(
            callbacks_key("abc", CallbackEvent::Complete),
            "BID-abc-callbacks-complete"
        );
        assert_eq!(
            processed_key("abc", CallbackEvent::Success),
            "BID-abc-processed-success"
        );
        assert_eq!(invalidated_key("abc"), "invalidated-bid-abc");
        assert_eq!(batch_lock_name("abc"), "batch-lock-abc");
        assert_eq!(
            callback_lock_name("abc", CallbackEvent::Complete),
            "callback-lock-abc-complete"
        );
    }
}
