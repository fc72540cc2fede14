//! Error types for store operations.
//!
//! The engine raises [`StoreError::DuplicateKey`], [`StoreError::KeyNotFound`]
//! and [`StoreError::ConcurrencyConflict`] itself. Failures coming from a
//! medium or codec are wrapped unchanged and never retried.

use crate::record::ETag;

/// Boxed error carried by the pass-through variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors returned by [`RecordStore`](crate::RecordStore) operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// `add` on a key that already holds a live record.
    #[error("key '{key}' already exists")]
    DuplicateKey { key: String },

    /// No live record exists for the key.
    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    /// The supplied ETag does not match the stored one.
    #[error("etag mismatch for key '{key}': supplied '{supplied}', current '{current}'")]
    ConcurrencyConflict {
        key: String,
        supplied: ETag,
        current: ETag,
    },

    /// Key rejected before reaching the medium.
    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    /// Stored bytes could not be decoded, or a value could not be encoded.
    #[error("codec error for key '{key}': {source}")]
    Codec {
        key: String,
        #[source]
        source: BoxError,
    },

    /// Failure reported by the underlying medium.
    #[error("{medium} medium failure: {source}")]
    Medium {
        medium: &'static str,
        #[source]
        source: BoxError,
    },

    /// Cancellation was observed before any change reached the medium.
    #[error("operation cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        Self::DuplicateKey { key: key.into() }
    }

    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn conflict(key: impl Into<String>, supplied: ETag, current: ETag) -> Self {
        Self::ConcurrencyConflict {
            key: key.into(),
            supplied,
            current,
        }
    }

    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// Wrap a codec failure.
    pub fn codec(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Codec {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Wrap a medium failure.
    pub fn medium(medium: &'static str, source: anyhow::Error) -> Self {
        Self::Medium {
            medium,
            source: source.into(),
        }
    }

    /// Returns true for [`StoreError::KeyNotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    /// Returns true for [`StoreError::DuplicateKey`].
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// Returns true for [`StoreError::ConcurrencyConflict`].
    ///
    /// Callers implementing retry-on-conflict reload, recompute and call
    /// `set` again when this is true.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns true for [`StoreError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
