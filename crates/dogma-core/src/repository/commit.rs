//! The commit algorithm and change application.
//!
//! All mutation goes through [`Repository::commit`]: under the per-
//! repository write lock, the change set is applied to an in-memory view
//! of the head tree, validated, written as one new tree + commit, and
//! published by two ref updates (revision ref, then master CAS). Watchers
//! are notified after the lock is released.

use std::collections::BTreeMap;

use dogma_git::{CommitRecord, Expectation, Identity, Oid, TreeEdit};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Author, Change, ChangeContent, CommitMessage, Revision, encode_message};
use crate::patch::{apply_json_patch, apply_text_patch};
use crate::path::FilePath;
use crate::query::render_json_text;
use crate::repository::tree;
use crate::repository::{HeadState, Repository, master_ref, revision_ref};

impl Repository {
    /// Append one commit on top of `base`, which must equal the current
    /// head.
    ///
    /// # Errors
    /// - [`Error::RevisionNotFound`] — `base` does not normalize;
    /// - [`Error::ChangeConflict`] — `base` is stale, or a change cannot be
    ///   applied against the current state;
    /// - [`Error::RedundantChange`] — the change set produces no difference;
    /// - [`Error::ShuttingDown`] — the repository was closed.
    pub fn commit(
        &self,
        base: Revision,
        timestamp_millis: i64,
        author: &Author,
        message: CommitMessage,
        changes: &[Change],
    ) -> Result<Revision> {
        self.commit_internal(Some(base), timestamp_millis, author, message, changes, false)
    }

    pub(crate) fn commit_internal(
        &self,
        base: Option<Revision>,
        timestamp_millis: i64,
        author: &Author,
        message: CommitMessage,
        changes: &[Change],
        allow_empty: bool,
    ) -> Result<Revision> {
        self.ensure_open()?;
        let guard = self.write_lock().lock();
        self.ensure_open()?;

        let (parent, new_revision, working) = match base {
            Some(base) => {
                let head = self.head_state();
                let normalized = self.normalize(base)?;
                if normalized != head.revision {
                    return Err(Error::conflict(format!(
                        "invalid baseRevision: expected {}, got {}",
                        head.revision, normalized
                    )));
                }
                let working = Working::load(self, head.tree)?;
                (Some(head), head.revision.forward(1), working)
            }
            // Repository creation: no parent, empty base tree.
            None => (None, Revision::INIT, Working::empty()),
        };

        let mut working = working;
        for change in changes {
            working.apply(self, change)?;
        }
        if !allow_empty && working.edits == 0 {
            return Err(Error::RedundantChange);
        }

        let base_tree = parent.map(|p| p.tree);
        let new_tree = self.store().insert_tree(base_tree, &working.tree_edits(self)?)?;
        if !allow_empty && Some(new_tree) == base_tree {
            return Err(Error::RedundantChange);
        }

        let seconds = timestamp_millis.div_euclid(1000);
        let identity = Identity {
            name: author.name.clone(),
            email: author.email.clone(),
            seconds,
        };
        let record = CommitRecord {
            tree: new_tree,
            parents: parent.iter().map(|p| p.commit).collect(),
            author: identity.clone(),
            committer: identity,
            message: encode_message(&message, new_revision),
        };
        let commit_oid = self.store().insert_commit(&record)?;

        self.store().update_ref(
            &revision_ref(new_revision.major())?,
            commit_oid,
            Expectation::MustNotExist,
        )?;
        let master_expectation = match parent {
            Some(p) => Expectation::MustMatch(p.commit),
            None => Expectation::MustNotExist,
        };
        self.store()
            .update_ref(&master_ref()?, commit_oid, master_expectation)?;

        self.set_head(HeadState {
            revision: new_revision,
            commit: commit_oid,
            tree: new_tree,
        });
        drop(guard);

        debug!(
            repository = %self.name(),
            revision = new_revision.major(),
            touched = working.touched.len(),
            "committed"
        );
        // Fan out after the write lock is released so a slow consumer can
        // never block the writer.
        self.notifier().notify(new_revision, &working.touched);
        Ok(new_revision)
    }

    /// Compute the changes a change set would produce against `base`,
    /// without committing anything.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for an out-of-range base;
    /// [`Error::ChangeConflict`] when a change cannot be applied.
    pub fn preview_diff(
        &self,
        base: Revision,
        changes: &[Change],
    ) -> Result<BTreeMap<String, Change>> {
        let normalized = self.normalize(base)?;
        let base_tree = self.tree_oid(normalized)?;
        let mut working = Working::load(self, base_tree)?;
        for change in changes {
            working.apply(self, change)?;
        }
        working.preview(self)
    }
}

// ---------------------------------------------------------------------------
// Working state
// ---------------------------------------------------------------------------

/// The content of one file in the working view.
#[derive(Clone)]
enum FileState {
    /// Same blob as in the base tree (possibly at a new path after rename).
    Kept(Oid),
    /// New or rewritten content, canonical text form.
    Written(String),
}

/// An in-memory view of a tree with a change set partially applied.
struct Working {
    /// Current files, absolute path → state.
    files: BTreeMap<String, FileState>,
    /// The base tree's files, for computing edits and removals.
    base: BTreeMap<String, Oid>,
    /// Count of effective mutations (no-op upserts don't count).
    edits: usize,
    /// Paths touched so far — removals under their old path, additions
    /// under their new one; renames contribute both.
    touched: Vec<String>,
}

impl Working {
    fn empty() -> Self {
        Self {
            files: BTreeMap::new(),
            base: BTreeMap::new(),
            edits: 0,
            touched: Vec::new(),
        }
    }

    fn load(repository: &Repository, tree: Oid) -> Result<Self> {
        let index = tree::flatten(repository.store(), tree)?;
        let files = index
            .files
            .iter()
            .map(|(path, oid)| (path.clone(), FileState::Kept(*oid)))
            .collect();
        Ok(Self {
            files,
            base: index.files,
            edits: 0,
            touched: Vec::new(),
        })
    }

    /// Current canonical text of a file, if present.
    fn text_of(&self, repository: &Repository, path: &str) -> Result<Option<String>> {
        match self.files.get(path) {
            None => Ok(None),
            Some(FileState::Written(text)) => Ok(Some(text.clone())),
            Some(FileState::Kept(oid)) => {
                let file_path = FilePath::new(path)?;
                Ok(Some(tree::load_text(repository.store(), &file_path, *oid)?))
            }
        }
    }

    fn apply(&mut self, repository: &Repository, change: &Change) -> Result<()> {
        let path = change.path.as_str().to_owned();
        match &change.content {
            ChangeContent::UpsertJson(value) => {
                if !change.path.is_json() {
                    return Err(Error::conflict(format!(
                        "UPSERT_JSON on a non-JSON path: {path}"
                    )));
                }
                self.write(repository, &path, render_json_text(value))
            }
            ChangeContent::UpsertText(text) => {
                let canonical = if change.path.is_json() {
                    let value: Value = serde_json::from_str(text).map_err(|e| {
                        Error::conflict(format!("failed to parse {path} as JSON: {e}"))
                    })?;
                    render_json_text(&value)
                } else {
                    sanitize_text(text)
                };
                self.write(repository, &path, canonical)
            }
            ChangeContent::Remove => self.remove(&path),
            ChangeContent::Rename(target) => self.rename(&path, target.as_str()),
            ChangeContent::ApplyJsonPatch(patch) => {
                if !change.path.is_json() {
                    return Err(Error::conflict(format!(
                        "APPLY_JSON_PATCH on a non-JSON path: {path}"
                    )));
                }
                let old = match self.text_of(repository, &path)? {
                    Some(text) => Some(serde_json::from_str::<Value>(&text).map_err(|e| {
                        Error::conflict(format!("existing entry {path} is not JSON: {e}"))
                    })?),
                    None => None,
                };
                let new = apply_json_patch(old.as_ref(), patch)?;
                self.write(repository, &path, render_json_text(&new))
            }
            ChangeContent::ApplyTextPatch(patch) => {
                let old = self.text_of(repository, &path)?.unwrap_or_default();
                let new = apply_text_patch(&old, patch)?;
                let canonical = if change.path.is_json() {
                    let value: Value = serde_json::from_str(&new).map_err(|e| {
                        Error::conflict(format!("patched content of {path} is not JSON: {e}"))
                    })?;
                    render_json_text(&value)
                } else {
                    sanitize_text(&new)
                };
                self.write(repository, &path, canonical)
            }
        }
    }

    fn write(&mut self, repository: &Repository, path: &str, canonical: String) -> Result<()> {
        self.ensure_no_file_ancestor(path)?;
        if self.text_of(repository, path)?.as_deref() == Some(canonical.as_str()) {
            // Byte-identical content is not an edit.
            return Ok(());
        }
        self.files
            .insert(path.to_owned(), FileState::Written(canonical));
        self.edits += 1;
        self.touched.push(path.to_owned());
        Ok(())
    }

    /// A file at `/a` forbids entries at `/a/...`.
    fn ensure_no_file_ancestor(&self, path: &str) -> Result<()> {
        let mut end = 0;
        for segment in path[1..].split('/') {
            end += 1 + segment.len();
            if end == path.len() {
                break;
            }
            if self.files.contains_key(&path[..end]) {
                return Err(Error::conflict(format!(
                    "cannot write {path}: {} is a file",
                    &path[..end]
                )));
            }
        }
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        if self.files.remove(path).is_some() {
            self.edits += 1;
            self.touched.push(path.to_owned());
            return Ok(());
        }
        let prefix = format!("{path}/");
        let under: Vec<String> = self
            .files
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .map(|(p, _)| p.clone())
            .collect();
        if under.is_empty() {
            return Err(Error::conflict(format!(
                "cannot remove non-existent file or directory: {path}"
            )));
        }
        for p in under {
            self.files.remove(&p);
            self.touched.push(p);
        }
        self.edits += 1;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let to_prefix = format!("{to}/");
        let target_occupied = self.files.contains_key(to)
            || self
                .files
                .range(to_prefix.clone()..)
                .take_while(|(p, _)| p.starts_with(&to_prefix))
                .next()
                .is_some();
        if target_occupied {
            return Err(Error::conflict(format!(
                "cannot rename {from} to {to}: target exists"
            )));
        }
        self.ensure_no_file_ancestor(to)?;

        if let Some(state) = self.files.remove(from) {
            // A single file moves as-is.
            self.files.insert(to.to_owned(), state);
            self.edits += 1;
            self.touched.push(from.to_owned());
            self.touched.push(to.to_owned());
            return Ok(());
        }

        let from_prefix = format!("{from}/");
        if to_prefix.starts_with(&from_prefix) {
            return Err(Error::conflict(format!(
                "cannot rename {from} to {to}: target is under the source"
            )));
        }
        let moved: Vec<String> = self
            .files
            .range(from_prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&from_prefix))
            .map(|(p, _)| p.clone())
            .collect();
        if moved.is_empty() {
            return Err(Error::conflict(format!(
                "cannot rename non-existent file or directory: {from}"
            )));
        }
        for old_path in moved {
            let suffix = &old_path[from.len()..];
            let new_path = format!("{to}{suffix}");
            if let Some(state) = self.files.remove(&old_path) {
                self.files.insert(new_path.clone(), state);
            }
            self.touched.push(old_path);
            self.touched.push(new_path);
        }
        self.edits += 1;
        Ok(())
    }

    /// Turn the working view into store tree edits relative to the base.
    fn tree_edits(&self, repository: &Repository) -> Result<Vec<TreeEdit>> {
        let mut edits = Vec::new();
        for (path, _) in self
            .base
            .iter()
            .filter(|(path, _)| !self.files.contains_key(*path))
        {
            edits.push(TreeEdit::Remove {
                path: path[1..].to_owned(),
            });
        }
        for (path, state) in &self.files {
            let oid = match state {
                FileState::Kept(oid) => {
                    if self.base.get(path) == Some(oid) {
                        continue; // untouched
                    }
                    *oid
                }
                FileState::Written(text) => repository.store().insert_blob(text.as_bytes())?,
            };
            edits.push(TreeEdit::Upsert {
                path: path[1..].to_owned(),
                oid,
            });
        }
        Ok(edits)
    }

    /// Render the working view as the change map `preview_diff` returns:
    /// additions as upserts, modifications as patches, removals as removes.
    fn preview(&self, repository: &Repository) -> Result<BTreeMap<String, Change>> {
        let mut out = BTreeMap::new();
        for path in self.base.keys().filter(|p| !self.files.contains_key(*p)) {
            out.insert(
                path.clone(),
                Change {
                    path: FilePath::new(path)?,
                    content: ChangeContent::Remove,
                },
            );
        }
        for (path_str, state) in &self.files {
            let file_path = FilePath::new(path_str)?;
            match (state, self.base.get(path_str)) {
                (FileState::Kept(oid), Some(base_oid)) if oid == base_oid => {}
                (state, Some(base_oid)) => {
                    let old = tree::load_text(repository.store(), &file_path, *base_oid)?;
                    let new = match state {
                        FileState::Written(text) => text.clone(),
                        FileState::Kept(oid) => {
                            tree::load_text(repository.store(), &file_path, *oid)?
                        }
                    };
                    out.insert(
                        path_str.clone(),
                        super::history::modification_change(&file_path, &old, &new)?,
                    );
                }
                (state, None) => {
                    let text = match state {
                        FileState::Written(text) => text.clone(),
                        FileState::Kept(oid) => {
                            tree::load_text(repository.store(), &file_path, *oid)?
                        }
                    };
                    out.insert(
                        path_str.clone(),
                        super::history::upsert_change(&file_path, &text)?,
                    );
                }
            }
        }
        Ok(out)
    }
}

/// Normalize line endings and guarantee a trailing newline.
fn sanitize_text(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_appends_newline_and_normalizes_crlf() {
        assert_eq!(sanitize_text("a\r\nb"), "a\nb\n");
        assert_eq!(sanitize_text("a\n"), "a\n");
        assert_eq!(sanitize_text(""), "\n");
    }

    #[test]
    fn json_content_is_stored_compact_with_trailing_newline() {
        let value: Value = serde_json::from_str("{\"a\": 1}").unwrap();
        assert_eq!(render_json_text(&value), "{\"a\":1}\n");
    }
}
