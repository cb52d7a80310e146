//! Store collaborator error types.

use thiserror::Error;

/// Errors raised by the store collaborator.
///
/// These never cross the facade boundary unwrapped; the broker maps them
/// into [`StructuredError`](crate::error::StructuredError).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A read or existence check could not be served.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The store rejected the transaction at submit time.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// Listener registration was refused.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// Internal store fault.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
