//! Error types for the store crate.

use std::fmt;

/// Errors from store operations.
///
/// A missing key is never a `StoreError`; see [`crate::Lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not complete the operation.
    Backend { operation: &'static str, reason: String },
    /// A stored value could not be encoded or decoded.
    Serialization { key: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { operation, reason } => {
                write!(f, "store {operation} failed: {reason}")
            }
            Self::Serialization { key, reason } => {
                write!(f, "failed to (de)serialize value at '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
