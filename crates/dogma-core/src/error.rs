//! Domain error kinds for repository operations.
//!
//! One enum so callers can match on the failure mode — conflicts, missing
//! revisions/entries, and query failures are part of the public contract
//! and must stay distinguishable. Object-store failures are wrapped as
//! [`Error::StorageFailed`]; they indicate infrastructure trouble, not a
//! bad request.

use dogma_git::StoreError;
use thiserror::Error;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by repository operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested revision does not exist (absolute value out of
    /// `1..=HEAD` after normalization).
    #[error("revision {revision} not found (head is {head})")]
    RevisionNotFound {
        /// The revision as requested by the caller.
        revision: i64,
        /// The repository head at the time of the request.
        head: i64,
    },

    /// No entry exists at the given path and revision.
    #[error("entry not found: {path} (revision {revision})")]
    EntryNotFound {
        /// Normalized revision that was inspected.
        revision: i64,
        /// The path that had no entry.
        path: String,
    },

    /// A query could not be evaluated against the entry it targets.
    #[error("query on {path} failed: {message}")]
    QueryFailed {
        /// The entry path the query ran against.
        path: String,
        /// Why evaluation failed.
        message: String,
    },

    /// A change cannot be applied against the current state — stale base
    /// revision, patch mismatch, rename/remove against a missing or
    /// occupied path.
    #[error("change conflict: {message}")]
    ChangeConflict {
        /// What conflicted.
        message: String,
    },

    /// The commit would not change anything.
    #[error("redundant change: commit produces no difference")]
    RedundantChange,

    /// Malformed input: bad path, bad pattern, bad revision string, bad
    /// patch document.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was malformed.
        message: String,
    },

    /// The repository is shutting down or has been removed; outstanding
    /// watches complete with this error.
    #[error("repository is shutting down")]
    ShuttingDown,

    /// The object store failed; the repository may be unusable.
    #[error("storage failed: {0}")]
    StorageFailed(#[from] StoreError),
}

impl Error {
    /// Shorthand for a [`Error::ChangeConflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ChangeConflict {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::InvalidArgument`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
