//! Store error types

use thiserror::Error;

/// Errors that can occur during shared store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the store backend
    #[error("Store connection error: {0}")]
    ConnectionError(String),

    /// Generic backend error
    #[error("Store backend error: {0}")]
    BackendError(String),

    /// A reply did not have the shape the protocol expected
    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
