//! Store error types and result alias.
//!
//! This module defines the error types that can occur during recipe store
//! operations. All engine implementations must map their internal errors to
//! these standardized error types.
//!
//! # Error Types
//!
//! - [`StoreError::InvalidArgument`] - Caller misuse, e.g. deleting a recipe with no id
//! - [`StoreError::Allocation`] - Identity allocation service unreachable or unsuccessful
//! - [`StoreError::Serialization`] - Data encoding/decoding failures
//! - [`StoreError::Internal`] - Engine-specific internal errors
//!
//! Two expected outcomes are deliberately *not* errors:
//!
//! - A lookup miss is `Ok(None)`, never `Err`.
//! - A stale-version save returns the previously stored record unchanged;
//!   callers detect rejection by comparing versions.
//!
//! # Example
//!
//! ```
//! use recipes_storage::{StoreError, StoreResult};
//!
//! fn remove(id: Option<i64>) -> StoreResult<()> {
//!     match id {
//!         Some(_) => Ok(()),
//!         None => Err(StoreError::invalid_argument("Could not delete recipe with no id")),
//!     }
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for store operations.
///
/// All store operations return this type, providing consistent error handling
/// across different engine implementations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during recipe store operations.
///
/// This enum represents the canonical set of errors that any storage engine
/// can produce. Engine implementations should map their internal error types
/// to these variants.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The caller supplied an argument the operation cannot act on.
    ///
    /// Never retried; the message is stable and part of the contract
    /// (e.g. `"Could not delete recipe with no id"`).
    #[error("{message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// The identity allocation service did not return a usable id.
    ///
    /// Raised when the allocation endpoint is unreachable or responds with a
    /// non-success status. A save that fails here leaves no partial state
    /// behind: nothing is written and no notification is published.
    #[error("Id allocation failed: {message}")]
    Allocation {
        /// Description of the allocation failure.
        message: String,
        /// The underlying error that caused the allocation to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// This error occurs when a record cannot be encoded for storage or
    /// decoded when retrieved. This typically indicates data corruption or
    /// schema incompatibility in an engine's physical layout.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage engine error.
    ///
    /// This is a catch-all for engine-specific errors that don't fit other
    /// categories.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl StoreError {
    /// Creates a new `InvalidArgument` error with the given message.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Creates a new `Allocation` error with the given message.
    #[must_use]
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation { message: message.into(), source: None }
    }

    /// Creates a new `Allocation` error with a message and source error.
    #[must_use]
    pub fn allocation_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Allocation { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_message_is_verbatim() {
        let err = StoreError::invalid_argument("Could not delete recipe with no id");
        assert_eq!(err.to_string(), "Could not delete recipe with no id");
    }

    #[test]
    fn allocation_preserves_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StoreError::allocation_with_source("connect failed", io);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Id allocation failed"));
    }

    #[test]
    fn serialization_without_source() {
        let err = StoreError::serialization("bad frame");
        assert!(std::error::Error::source(&err).is_none());
    }
}
