//! Server-level error types.
//!
//! [`ServerError`] covers the manager and executor layers: lifecycle
//! collisions, replication state, and pass-through of the core domain
//! errors. Domain errors from the repository engine stay matchable through
//! the [`ServerError::Core`] variant.

use thiserror::Error;

/// Result alias for the server layer.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by the project manager and command executors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A project with this name already exists (live or soft-removed).
    #[error("project already exists: {name}")]
    ProjectExists {
        /// The colliding name.
        name: String,
    },

    /// No such project.
    #[error("project not found: {name}")]
    ProjectNotFound {
        /// The missing name.
        name: String,
    },

    /// A repository with this name already exists (live or soft-removed).
    #[error("repository already exists: {project}/{name}")]
    RepositoryExists {
        /// The parent project.
        project: String,
        /// The colliding name.
        name: String,
    },

    /// No such repository.
    #[error("repository not found: {project}/{name}")]
    RepositoryNotFound {
        /// The parent project.
        project: String,
        /// The missing name.
        name: String,
    },

    /// No such session.
    #[error("session not found: {id}")]
    SessionNotFound {
        /// The missing session id.
        id: String,
    },

    /// A project or repository name failed validation.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The replica is not writable; mutating commands are refused unless
    /// force-pushed.
    #[error("server is in read-only mode")]
    ReadOnly,

    /// A command missed its deadline. The command may still apply if its
    /// log entry was already appended.
    #[error("command timed out after {millis} ms")]
    Timeout {
        /// The deadline that elapsed.
        millis: u64,
    },

    /// The cluster-wide logical lock is held; the caller may retry.
    #[error("replication lock busy: {key}")]
    LockBusy {
        /// The contended lock key.
        key: String,
    },

    /// The local state disagrees with the replication log; the replica has
    /// halted into read-only mode.
    #[error("replica diverged from the replication log: {message}")]
    Divergence {
        /// What disagreed.
        message: String,
    },

    /// The replication log itself failed.
    #[error("replication failed: {message}")]
    ReplicationFailed {
        /// What failed.
        message: String,
    },

    /// A domain error from the repository engine.
    #[error(transparent)]
    Core(#[from] dogma_core::Error),

    /// An object-store failure outside the engine.
    #[error(transparent)]
    Store(#[from] dogma_git::StoreError),

    /// Filesystem trouble in the manager (directory layout, renames).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
