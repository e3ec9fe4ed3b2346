//! The [`ObjectStore`] trait — the single abstraction boundary between the
//! dogma repository engine and its persistence backends.
//!
//! The engine interacts with storage exclusively through this trait. The
//! trait is object-safe so callers can hold `Arc<dyn ObjectStore>` and swap
//! backends without recompiling the engine:
//!
//! | Backend | Module | Layout |
//! |---------|--------|--------|
//! | gix     | [`gix_store`](crate::gix_store) | standard bare git repository |
//! | cipher  | [`cipher_store`](crate::cipher_store) | encrypted key-value store |
//!
//! Both backends address objects by the SHA-1 of the plaintext git-format
//! object, so OIDs — and therefore revision refs and commit ids — are
//! identical regardless of backend.

use crate::error::StoreError;
use crate::types::{CommitRecord, Expectation, Oid, RefName, TreeEdit, TreeEntry};

/// The object-store abstraction used by the dogma repository engine.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return
/// position outside of `Result`. Callers use `Arc<dyn ObjectStore>`.
///
/// # Contract
///
/// - Inserts are idempotent on content: inserting the same bytes twice
///   returns the same OID and stores one object.
/// - Ref updates are atomic and durable before the call returns `Ok`.
/// - Any ref update that names an inserted object observes that object as
///   already flushed; backends that batch object writes must flush first.
pub trait ObjectStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Object write
    // -----------------------------------------------------------------------

    /// Write a blob and return its OID.
    fn insert_blob(&self, data: &[u8]) -> Result<Oid, StoreError>;

    /// Derive a new tree by applying `edits` to the tree at `base`, write
    /// it, and return its OID.
    ///
    /// `base = None` starts from the empty tree. Upserts create missing
    /// intermediate directories; removes drop files or whole subtrees.
    fn insert_tree(&self, base: Option<Oid>, edits: &[TreeEdit]) -> Result<Oid, StoreError>;

    /// Write a commit object and return its OID.
    fn insert_commit(&self, commit: &CommitRecord) -> Result<Oid, StoreError>;

    // -----------------------------------------------------------------------
    // Object read
    // -----------------------------------------------------------------------

    /// Read the contents of a blob.
    ///
    /// # Errors
    /// [`StoreError::ObjectNotFound`] if no such object exists.
    fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, StoreError>;

    /// Read the entries of a tree (one level deep, not recursive).
    ///
    /// # Errors
    /// [`StoreError::ObjectNotFound`] if no such object exists.
    fn read_tree(&self, oid: Oid) -> Result<Vec<TreeEntry>, StoreError>;

    /// Read a commit object.
    ///
    /// # Errors
    /// [`StoreError::ObjectNotFound`] if no such object exists.
    fn read_commit(&self, oid: Oid) -> Result<CommitRecord, StoreError>;

    // -----------------------------------------------------------------------
    // Refs
    // -----------------------------------------------------------------------

    /// Resolve a ref to its OID, returning `None` if the ref does not exist.
    /// Symbolic refs are peeled to their target OID.
    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError>;

    /// Compare-and-set a ref to `new`.
    ///
    /// The update is atomic and durable before this returns `Ok`.
    ///
    /// # Errors
    /// [`StoreError::RefConflict`] if the ref's current value does not
    /// satisfy `expected`.
    fn update_ref(&self, name: &RefName, new: Oid, expected: Expectation)
    -> Result<(), StoreError>;

    /// Point a symbolic ref (in practice: `HEAD`) at another ref.
    fn set_symbolic_ref(&self, name: &RefName, target: &RefName) -> Result<(), StoreError>;

    /// List refs whose full name starts with `prefix`, sorted by name.
    /// Symbolic refs are omitted.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, StoreError>;

    /// Rename a ref, preserving its target.
    ///
    /// # Errors
    /// [`StoreError::ObjectNotFound`] if `old` does not exist;
    /// [`StoreError::RefConflict`] if `new` already exists.
    fn rename_ref(&self, old: &RefName, new: &RefName) -> Result<(), StoreError>;

    /// Delete a ref. No-op if the ref does not exist.
    fn delete_ref(&self, name: &RefName) -> Result<(), StoreError>;
}
