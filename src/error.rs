//! Error types for the batch tracking core.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatcherError {
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Lock error: {0}")]
    LockError(String),
    #[error("Lock acquisition timed out: {0}")]
    LockTimeout(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Batch {0} has already been started")]
    BatchAlreadyStarted(String),
    #[error("Batch {0} has already been committed")]
    BatchAlreadyCommitted(String),
    #[error("Batch {0} has not been started")]
    BatchNotStarted(String),
    #[error("Callback error: {0}")]
    CallbackError(String),
    #[error("No callback registered for descriptor '{0}'")]
    UnknownCallback(String),
    #[error("No callback channel installed")]
    ChannelNotInstalled,
    #[error(
        "Completion condition for '{event}' on batch {bid} no longer holds: \
         pending={pending}, failed={failed}, children={children}, resolved={resolved}"
    )]
    CompletionConditionChanged {
        bid: String,
        event: String,
        pending: i64,
        failed: i64,
        children: i64,
        resolved: i64,
    },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<StoreError> for BatcherError {
    fn from(error: StoreError) -> Self {
        BatcherError::StoreError(error.to_string())
    }
}

impl From<serde_json::Error> for BatcherError {
    fn from(error: serde_json::Error) -> Self {
        BatcherError::SerializationError(error.to_string())
    }
}

pub type Result<T> = anyhow::Result<T, BatcherError>;
