//! The gix-backed implementation of [`ObjectStore`].
//!
//! Holds a [`gix::ThreadSafeRepository`] and re-localizes it per call, so a
//! `GixStore` is `Send + Sync` and can sit behind `Arc<dyn ObjectStore>`
//! while readers run concurrently with the single writer.

use std::path::Path;

use crate::error::StoreError;
use crate::store::ObjectStore;
use crate::types::{CommitRecord, Expectation, Oid, RefName, TreeEdit, TreeEntry};

/// An [`ObjectStore`] backed by a bare git repository via
/// [gix](https://github.com/GitoxideLabs/gitoxide).
///
/// Construct via [`GixStore::init`] (new repository) or [`GixStore::open`].
pub struct GixStore {
    pub(crate) inner: gix::ThreadSafeRepository,
}

impl GixStore {
    /// Create a new bare repository at `path` and point `HEAD` at
    /// `refs/heads/master`.
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        let repo = gix::init_bare(path).map_err(|e| StoreError::Backend {
            message: format!("failed to init repository at {}: {e}", path.display()),
        })?;
        let store = Self {
            inner: repo.into_sync(),
        };
        store.set_symbolic_ref(&crate::refs_impl::head(), &crate::refs_impl::master())?;
        Ok(store)
    }

    /// Open the bare repository at exactly `path` (no parent discovery, no
    /// user-level configuration).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let repo = gix::open_opts(path, gix::open::Options::isolated()).map_err(|e| {
            StoreError::Backend {
                message: format!("failed to open repository at {}: {e}", path.display()),
            }
        })?;
        Ok(Self {
            inner: repo.into_sync(),
        })
    }

    /// A thread-local view of the repository for the current call.
    pub(crate) fn local(&self) -> gix::Repository {
        self.inner.to_thread_local()
    }
}

impl ObjectStore for GixStore {
    // === Object write ===
    fn insert_blob(&self, data: &[u8]) -> Result<Oid, StoreError> {
        crate::objects_impl::insert_blob(self, data)
    }

    fn insert_tree(&self, base: Option<Oid>, edits: &[TreeEdit]) -> Result<Oid, StoreError> {
        crate::objects_impl::insert_tree(self, base, edits)
    }

    fn insert_commit(&self, commit: &CommitRecord) -> Result<Oid, StoreError> {
        crate::objects_impl::insert_commit(self, commit)
    }

    // === Object read ===
    fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, StoreError> {
        crate::objects_impl::read_blob(self, oid)
    }

    fn read_tree(&self, oid: Oid) -> Result<Vec<TreeEntry>, StoreError> {
        crate::objects_impl::read_tree(self, oid)
    }

    fn read_commit(&self, oid: Oid) -> Result<CommitRecord, StoreError> {
        crate::objects_impl::read_commit(self, oid)
    }

    // === Refs ===
    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError> {
        crate::refs_impl::read_ref(self, name)
    }

    fn update_ref(
        &self,
        name: &RefName,
        new: Oid,
        expected: Expectation,
    ) -> Result<(), StoreError> {
        crate::refs_impl::update_ref(self, name, new, expected)
    }

    fn set_symbolic_ref(&self, name: &RefName, target: &RefName) -> Result<(), StoreError> {
        crate::refs_impl::set_symbolic_ref(self, name, target)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, StoreError> {
        crate::refs_impl::list_refs(self, prefix)
    }

    fn rename_ref(&self, old: &RefName, new: &RefName) -> Result<(), StoreError> {
        crate::refs_impl::rename_ref(self, old, new)
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), StoreError> {
        crate::refs_impl::delete_ref(self, name)
    }
}
