//! The per-repository commit engine.
//!
//! One `Repository` owns one linear history inside one object-store
//! namespace. Reads resolve a revision to a commit through the revision
//! refs and walk immutable trees, so they run concurrently with the single
//! writer; all mutation funnels through the per-repository write lock in
//! [`commit`](Repository::commit).
//!
//! Ref layout (mandatory for interop with git tooling and mirrors):
//!
//! ```text
//! HEAD                          → refs/heads/master   (symbolic)
//! refs/heads/master             → most recent commit
//! refs/revisions/<xx>/<major>   → the commit for that revision
//! ```
//!
//! `<xx>` is the low byte of the major number in hex, which bounds the
//! fan-out of any single ref directory.

mod commit;
mod history;
mod tree;
mod watch;

pub use watch::{WatchListener, WatchSignal};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::info;

use dogma_git::{ObjectStore, Oid, RefName};

use crate::error::{Error, Result};
use crate::model::{
    Author, Commit, CommitMessage, Entry, EntryContent, EntryType, Revision, decode_message,
};
use crate::path::{FilePath, PathPattern};
use crate::query::{MergeQuery, Query};
use self::watch::WatchNotifier;

/// Options for [`Repository::find`].
#[derive(Clone, Copy, Debug)]
pub struct FindOptions {
    /// Load file content (directories never carry content).
    pub fetch_content: bool,
    /// Stop after this many entries.
    pub max_entries: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            fetch_content: true,
            max_entries: usize::MAX,
        }
    }
}

/// The result of a merge query: the merged document plus the sources that
/// actually contributed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedEntry {
    /// The normalized revision the merge ran against.
    pub revision: crate::model::Revision,
    /// The source paths that existed, in merge order.
    pub paths: Vec<FilePath>,
    /// The merged (and optionally filtered) document.
    pub content: Value,
}

/// The head of a repository: revision, commit, and root tree.
#[derive(Clone, Copy, Debug)]
pub(crate) struct HeadState {
    pub(crate) revision: crate::model::Revision,
    pub(crate) commit: Oid,
    pub(crate) tree: Oid,
}

/// A version-controlled repository with a linear history.
pub struct Repository {
    project: String,
    name: String,
    store: Arc<dyn ObjectStore>,
    head: RwLock<HeadState>,
    write_lock: Mutex<()>,
    notifier: WatchNotifier,
    closed: AtomicBool,
}

impl Repository {
    /// Create a new repository: writes the initial commit (revision 1,
    /// empty tree, summary "Create a new repository") and the ref layout.
    ///
    /// # Errors
    /// Fails if the store already contains a master ref, or on storage
    /// failure.
    pub fn create(
        store: Arc<dyn ObjectStore>,
        project: &str,
        name: &str,
        author: &Author,
        timestamp_millis: i64,
    ) -> Result<Self> {
        let repository = Self {
            project: project.to_owned(),
            name: name.to_owned(),
            store,
            // Placeholder until the initial commit lands below.
            head: RwLock::new(HeadState {
                revision: Revision::INIT,
                commit: Oid::ZERO,
                tree: Oid::ZERO,
            }),
            write_lock: Mutex::new(()),
            notifier: WatchNotifier::new(),
            closed: AtomicBool::new(false),
        };
        repository.commit_internal(
            None,
            timestamp_millis,
            author,
            CommitMessage::summary_only("Create a new repository"),
            &[],
            true,
        )?;
        info!(project, repository = name, "created repository");
        Ok(repository)
    }

    /// Open an existing repository, recovering the head revision from the
    /// commit message payload (or, for foreign histories, by counting the
    /// parent chain).
    ///
    /// # Errors
    /// Fails when the master ref is missing or the head commit is
    /// unreadable.
    pub fn open(store: Arc<dyn ObjectStore>, project: &str, name: &str) -> Result<Self> {
        let master = master_ref()?;
        let commit_oid = store
            .read_ref(&master)?
            .ok_or_else(|| Error::StorageFailed(dogma_git::StoreError::ObjectNotFound {
                message: format!("repository {project}/{name} has no master ref"),
            }))?;
        let record = store.read_commit(commit_oid)?;
        let revision = match decode_message(&record.message).1 {
            Some(revision) => revision,
            None => count_revision(store.as_ref(), &record)?,
        };
        Ok(Self {
            project: project.to_owned(),
            name: name.to_owned(),
            store,
            head: RwLock::new(HeadState {
                revision,
                commit: commit_oid,
                tree: record.tree,
            }),
            write_lock: Mutex::new(()),
            notifier: WatchNotifier::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// The repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent project's name. Repositories hold their project by name
    /// only — ownership goes the other way.
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.project
    }

    /// The object store backing this repository, for collaborators (mirror
    /// workers) that operate below the repository interface.
    #[must_use]
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// The current head revision.
    #[must_use]
    pub fn head_revision(&self) -> Revision {
        self.head.read().revision
    }

    /// The author of the initial commit.
    ///
    /// # Errors
    /// Storage failures only.
    pub fn author(&self) -> Result<Author> {
        Ok(self.commit_info(Revision::INIT)?.author)
    }

    /// Creation time, in whole seconds since the epoch.
    ///
    /// # Errors
    /// Storage failures only.
    pub fn creation_time_secs(&self) -> Result<i64> {
        Ok(self.commit_info(Revision::INIT)?.timestamp_secs)
    }

    // -----------------------------------------------------------------------
    // Revision resolution
    // -----------------------------------------------------------------------

    /// Normalize a revision to its absolute form (`1..=HEAD`).
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] when the absolute value falls outside
    /// `1..=HEAD`.
    pub fn normalize(&self, revision: Revision) -> Result<Revision> {
        let head = self.head.read().revision;
        let absolute = if revision.is_relative() {
            head.major() + revision.major() + 1
        } else {
            revision.major()
        };
        if absolute < 1 || absolute > head.major() {
            return Err(Error::RevisionNotFound {
                revision: revision.major(),
                head: head.major(),
            });
        }
        Revision::new(absolute)
    }

    /// The commit OID for a normalized revision, looked up through the
    /// revision refs.
    pub(crate) fn commit_oid(&self, normalized: Revision) -> Result<Oid> {
        let head = *self.head.read();
        if normalized == head.revision {
            return Ok(head.commit);
        }
        let name = revision_ref(normalized.major())?;
        self.store
            .read_ref(&name)?
            .ok_or_else(|| Error::RevisionNotFound {
                revision: normalized.major(),
                head: head.revision.major(),
            })
    }

    /// The root tree OID at a normalized revision.
    pub(crate) fn tree_oid(&self, normalized: Revision) -> Result<Oid> {
        let head = *self.head.read();
        if normalized == head.revision {
            return Ok(head.tree);
        }
        Ok(self.store.read_commit(self.commit_oid(normalized)?)?.tree)
    }

    /// The [`Commit`] metadata at a revision.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for an out-of-range revision.
    pub fn commit_info(&self, revision: Revision) -> Result<Commit> {
        let normalized = self.normalize(revision)?;
        let record = self.store.read_commit(self.commit_oid(normalized)?)?;
        let (message, _) = decode_message(&record.message);
        Ok(Commit {
            revision: normalized,
            author: Author::new(&record.author.name, &record.author.email),
            timestamp_secs: record.author.seconds,
            message,
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// `true` if an entry (file or directory) exists at `path`.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for an out-of-range revision.
    pub fn exists(&self, revision: Revision, path: &FilePath) -> Result<bool> {
        let normalized = self.normalize(revision)?;
        let tree = self.tree_oid(normalized)?;
        Ok(tree::lookup(self.store.as_ref(), tree, path)?.is_some())
    }

    /// Load the entry at `path`, with content for files.
    ///
    /// # Errors
    /// [`Error::EntryNotFound`] when nothing exists at `path`;
    /// [`Error::RevisionNotFound`] for an out-of-range revision.
    pub fn get(&self, revision: Revision, path: &FilePath) -> Result<Entry> {
        let normalized = self.normalize(revision)?;
        if path.is_root() {
            return Ok(Entry::directory(FilePath::root()));
        }
        let tree = self.tree_oid(normalized)?;
        match tree::lookup(self.store.as_ref(), tree, path)? {
            Some(tree::Node::File(oid)) => {
                let content = tree::load_content(self.store.as_ref(), path, oid)?;
                Ok(Entry {
                    path: path.clone(),
                    kind: match content {
                        EntryContent::Json(_) => EntryType::Json,
                        EntryContent::Text(_) => EntryType::Text,
                    },
                    content: Some(content),
                })
            }
            Some(tree::Node::Directory(_)) => Ok(Entry::directory(path.clone())),
            None => Err(Error::EntryNotFound {
                revision: normalized.major(),
                path: path.to_string(),
            }),
        }
    }

    /// Load an entry and evaluate a query against it.
    ///
    /// # Errors
    /// As [`Repository::get`], plus [`Error::QueryFailed`] when the query
    /// does not fit the entry.
    pub fn get_query(&self, revision: Revision, query: &Query) -> Result<Entry> {
        let entry = self.get(revision, &query.path)?;
        query.apply_to_entry(&entry)
    }

    /// Evaluate a merge query.
    ///
    /// # Errors
    /// [`Error::EntryNotFound`] when a required source (or every optional
    /// source) is missing; [`Error::QueryFailed`] for non-JSON sources or a
    /// postfilter that matches nothing.
    pub fn merged(&self, revision: Revision, query: &MergeQuery) -> Result<MergedEntry> {
        let normalized = self.normalize(revision)?;
        let mut merged = Value::Null;
        let mut paths = Vec::new();
        for source in &query.sources {
            match self.get(normalized, &source.path) {
                Ok(entry) => {
                    let value = entry.content_as_json()?;
                    crate::query::merge_values(&mut merged, value.clone());
                    paths.push(source.path.clone());
                }
                Err(Error::EntryNotFound { .. }) if source.optional => {}
                Err(other) => return Err(other),
            }
        }
        if paths.is_empty() {
            return Err(Error::EntryNotFound {
                revision: normalized.major(),
                path: query
                    .sources
                    .iter()
                    .map(|s| s.path.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            });
        }
        let content = query.postfilter(merged)?;
        Ok(MergedEntry {
            revision: normalized,
            paths,
            content,
        })
    }

    /// Find entries matching a path pattern, ordered by path.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for an out-of-range revision.
    pub fn find(
        &self,
        revision: Revision,
        pattern: &PathPattern,
        options: FindOptions,
    ) -> Result<BTreeMap<String, Entry>> {
        let normalized = self.normalize(revision)?;
        let tree = self.tree_oid(normalized)?;
        let index = tree::flatten(self.store.as_ref(), tree)?;

        let mut out = BTreeMap::new();
        for dir in &index.directories {
            if out.len() >= options.max_entries {
                return Ok(out);
            }
            if pattern.matches(dir) {
                let path = FilePath::new(dir)?;
                out.insert(dir.clone(), Entry::directory(path));
            }
        }
        for (path_str, oid) in &index.files {
            if out.len() >= options.max_entries {
                break;
            }
            if !pattern.matches(path_str) {
                continue;
            }
            let path = FilePath::new(path_str)?;
            let entry = if options.fetch_content {
                let content = tree::load_content(self.store.as_ref(), &path, *oid)?;
                Entry {
                    path,
                    kind: match content {
                        EntryContent::Json(_) => EntryType::Json,
                        EntryContent::Text(_) => EntryType::Text,
                    },
                    content: Some(content),
                }
            } else {
                let kind = EntryType::for_file(&path);
                Entry::without_content(path, kind)
            };
            out.insert(path_str.clone(), entry);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse new work and complete all outstanding watchers with
    /// [`Error::ShuttingDown`]. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.notifier.shutdown();
            info!(project = %self.project, repository = %self.name, "closed repository");
        }
    }

    /// Wait until no commit is in flight, up to `timeout`. Used by purge:
    /// the caller closes the repository first so no new commit can start.
    #[must_use]
    pub fn quiesce(&self, timeout: Duration) -> bool {
        match self.write_lock.try_lock_for(timeout) {
            Some(guard) => {
                drop(guard);
                true
            }
            None => false,
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }

    pub(crate) fn head_state(&self) -> HeadState {
        *self.head.read()
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub(crate) fn notifier(&self) -> &WatchNotifier {
        &self.notifier
    }

    pub(crate) fn write_lock(&self) -> &Mutex<()> {
        &self.write_lock
    }

    pub(crate) fn set_head(&self, state: HeadState) {
        *self.head.write() = state;
    }
}

/// `refs/heads/master`.
pub(crate) fn master_ref() -> Result<RefName> {
    RefName::new("refs/heads/master").map_err(|e| Error::invalid(e.to_string()))
}

/// `refs/revisions/<low-byte-hex>/<major>`.
pub(crate) fn revision_ref(major: i64) -> Result<RefName> {
    let fanout = u8::try_from(major & 0xff).unwrap_or_default();
    RefName::new(&format!("refs/revisions/{fanout:02x}/{major}"))
        .map_err(|e| Error::invalid(e.to_string()))
}

/// Recover a revision for a foreign head commit by walking the parent
/// chain: a linear history of `n` commits ends at revision `n`.
fn count_revision(store: &dyn ObjectStore, head: &dogma_git::CommitRecord) -> Result<Revision> {
    let mut count: i64 = 1;
    let mut parents = head.parents.clone();
    while let Some(parent) = parents.first().copied() {
        count += 1;
        parents = store.read_commit(parent)?.parents;
    }
    Revision::new(count)
}
