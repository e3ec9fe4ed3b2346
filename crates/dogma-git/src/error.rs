//! Error types for object-store operations.
//!
//! [`StoreError`] is the single error type returned by all
//! [`ObjectStore`](crate::ObjectStore) trait methods. It uses rich enum
//! variants so callers can match on specific failure modes (missing object,
//! CAS mismatch, corrupt ciphertext) without parsing error messages.

use thiserror::Error;

/// Errors returned by [`ObjectStore`](crate::ObjectStore) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A requested object or ref was not found.
    #[error("object not found: {message}")]
    ObjectNotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A ref update failed because the ref's current value did not match the
    /// expected old value (compare-and-set / optimistic concurrency failure).
    #[error("ref conflict on `{ref_name}`: {message}")]
    RefConflict {
        /// The ref that could not be updated.
        ref_name: String,
        /// Details about the mismatch.
        message: String,
    },

    /// An OID string could not be parsed or was otherwise invalid.
    #[error("invalid OID `{value}`: {reason}")]
    InvalidOid {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// Decryption failed or an encrypted record was malformed.
    ///
    /// Distinct from [`StoreError::Backend`] because a corrupt or
    /// wrong-key ciphertext is an operator-actionable condition (wrong KEK,
    /// torn write) rather than a programming error.
    #[error("cipher error: {message}")]
    Cipher {
        /// What failed (seal, open, key unwrap).
        message: String,
    },

    /// An I/O error occurred (file system, fsync, rename).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying backend (gix or the key-value store) returned an
    /// unclassified error. The `message` should include enough context to
    /// diagnose the failure.
    #[error("store backend error: {message}")]
    Backend {
        /// Freeform error description from the backend.
        message: String,
    },
}
