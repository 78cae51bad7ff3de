//! # Callback Layer
//!
//! Everything between "a completion condition holds" and "user code ran
//! exactly once": per-event registrations persisted alongside the batch, a
//! registry resolving descriptor strings to callables, the delivery channel
//! contract, the idempotent dispatcher, and the finalize step that feeds
//! hierarchy propagation.
//!
//! ## Events
//!
//! - `complete`: every work item is resolved or failed, and every child
//!   batch has completed.
//! - `success`: every work item resolved successfully, and every child
//!   batch succeeded. `success` implies `complete`; `complete` fires first.

pub mod channel;
pub mod dispatcher;
pub mod finalize;
pub mod registry;

pub use channel::{CallbackChannel, CallbackDelivery, DeliveryTag, InProcessChannel};
pub use registry::{BatchCallback, CallbackRegistry};

use crate::error::BatcherError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Batch lifecycle events callbacks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackEvent {
    Complete,
    Success,
}

impl CallbackEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            CallbackEvent::Complete => "complete",
            CallbackEvent::Success => "success",
        }
    }
}

impl fmt::Display for CallbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallbackEvent {
    type Err = BatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(CallbackEvent::Complete),
            "success" => Ok(CallbackEvent::Success),
            other => Err(BatcherError::CallbackError(format!(
                "unknown callback event '{other}'"
            ))),
        }
    }
}

/// One registered callback: a descriptor naming the target plus an opaque
/// options map passed through verbatim at delivery time.
///
/// Serialized as JSON into the batch's per-event registration set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackRegistration {
    pub callback: String,
    #[serde(default)]
    pub opts: serde_json::Value,
}
