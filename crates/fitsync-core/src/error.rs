//! Error types for fitsync-core
//!
//! A cache miss is control flow (`Option`), never an error, and an
//! idempotent repeat completion is success, never an error. Only genuine
//! I/O failure or malformed input reaches callers.

use thiserror::Error;

/// Errors surfaced by the sync and completion layers.
///
/// `Clone` is derived because an in-flight fetch fans its outcome out to
/// every caller waiting on the same collection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Network or backend failure. Retryable.
    #[error("remote backend unavailable: {reason}")]
    RemoteUnavailable { reason: String },

    /// A bounded remote call did not settle in time. Retryable.
    #[error("remote call `{operation}` timed out after {timeout_secs}s")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    /// The remote returned a payload that does not match the expected
    /// shape. Retryable, treated like a backend fault.
    #[error("malformed payload from `{collection}`: {message}")]
    Decode {
        collection: String,
        message: String,
    },

    /// The caller handed us a malformed request. Rejected before any I/O.
    #[error("invalid request: {message}")]
    Validation { message: String },
}

impl SyncError {
    pub fn remote(reason: impl Into<String>) -> Self {
        SyncError::RemoteUnavailable {
            reason: reason.into(),
        }
    }

    pub fn decode(collection: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Decode {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation {
            message: message.into(),
        }
    }

    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SyncError::Validation { .. })
    }
}
