//! dogma-core — the versioned-storage domain: revisions, entries, changes,
//! the per-repository commit engine, the query evaluator, and the
//! long-poll watch notifier.
//!
//! Storage is abstract: everything here runs against
//! [`dogma_git::ObjectStore`], so the same engine serves the plaintext git
//! backend and the encrypted key-value backend.

pub mod error;
pub mod model;
pub mod patch;
pub mod path;
pub mod query;
pub mod repository;

pub use error::{Error, Result};
pub use model::{
    Author, Change, ChangeContent, Commit, CommitMessage, Entry, EntryContent, EntryType, Markup,
    Revision,
};
pub use path::{FilePath, PathPattern};
pub use query::{MergeQuery, MergeSource, Query, QueryKind};
pub use repository::{
    FindOptions, MergedEntry, Repository, WatchListener, WatchSignal,
};
