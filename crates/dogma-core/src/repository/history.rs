//! History walks and tree diffs.

use std::collections::BTreeMap;

use dogma_git::Oid;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Change, ChangeContent, Commit, Revision};
use crate::patch::{diff_json, diff_text};
use crate::path::{FilePath, PathPattern};
use crate::repository::{Repository, tree};

impl Repository {
    /// List the commits between `from` and `to` (both inclusive after
    /// normalization) whose changes touch `pattern`, ascending by revision
    /// regardless of argument order. At most `max_commits` results are
    /// returned, keeping the most recent ones.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for out-of-range endpoints;
    /// [`Error::InvalidArgument`] when `max_commits` is zero.
    pub fn history(
        &self,
        from: Revision,
        to: Revision,
        pattern: &PathPattern,
        max_commits: usize,
    ) -> Result<Vec<Commit>> {
        if max_commits == 0 {
            return Err(Error::invalid("max_commits must be positive"));
        }
        let from = self.normalize(from)?;
        let to = self.normalize(to)?;
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };

        let mut commits = Vec::new();
        let mut oid = self.commit_oid(hi)?;
        let mut revision = hi;
        loop {
            let record = self.store().read_commit(oid)?;
            let parent = record.parents.first().copied();
            let parent_tree = match parent {
                Some(parent_oid) => Some(self.store().read_commit(parent_oid)?.tree),
                // The initial commit has no parent; its diff is the whole tree.
                None => None,
            };
            let touched = changed_paths(self, parent_tree, record.tree)?;
            if touched.iter().any(|path| pattern.matches(path))
                // The initial commit's empty tree touches nothing, but it is
                // still part of every history.
                || parent.is_none()
            {
                commits.push(self.commit_info(revision)?);
                if commits.len() >= max_commits {
                    break;
                }
            }
            if revision <= lo {
                break;
            }
            let Some(parent_oid) = parent else { break };
            oid = parent_oid;
            revision = revision.backward(1);
        }

        commits.reverse();
        Ok(commits)
    }

    /// The changes turning the tree at `from` into the tree at `to`,
    /// restricted to `pattern`. `diff(r, r)` is empty.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] for out-of-range endpoints.
    pub fn diff(
        &self,
        from: Revision,
        to: Revision,
        pattern: &PathPattern,
    ) -> Result<BTreeMap<String, Change>> {
        let from = self.normalize(from)?;
        let to = self.normalize(to)?;
        if from == to {
            return Ok(BTreeMap::new());
        }

        let old = tree::flatten(self.store(), self.tree_oid(from)?)?;
        let new = tree::flatten(self.store(), self.tree_oid(to)?)?;

        let mut out = BTreeMap::new();
        for (path_str, old_oid) in &old.files {
            if !pattern.matches(path_str) {
                continue;
            }
            let path = FilePath::new(path_str)?;
            match new.files.get(path_str) {
                None => {
                    out.insert(
                        path_str.clone(),
                        Change {
                            path,
                            content: ChangeContent::Remove,
                        },
                    );
                }
                Some(new_oid) if new_oid != old_oid => {
                    let old_text = tree::load_text(self.store(), &path, *old_oid)?;
                    let new_text = tree::load_text(self.store(), &path, *new_oid)?;
                    out.insert(
                        path_str.clone(),
                        modification_change(&path, &old_text, &new_text)?,
                    );
                }
                Some(_) => {}
            }
        }
        for (path_str, new_oid) in &new.files {
            if old.files.contains_key(path_str) || !pattern.matches(path_str) {
                continue;
            }
            let path = FilePath::new(path_str)?;
            let text = tree::load_text(self.store(), &path, *new_oid)?;
            out.insert(path_str.clone(), upsert_change(&path, &text)?);
        }
        Ok(out)
    }

    /// `true` when the cumulative diff between two normalized revisions
    /// touches `pattern`. Drives the subscribe-time race check in watch.
    pub(crate) fn has_matching_change(
        &self,
        from: Revision,
        to: Revision,
        pattern: &PathPattern,
    ) -> Result<bool> {
        let old_tree = self.tree_oid(from)?;
        let new_tree = self.tree_oid(to)?;
        if old_tree == new_tree {
            return Ok(false);
        }
        let touched = changed_paths(self, Some(old_tree), new_tree)?;
        Ok(touched.iter().any(|path| pattern.matches(path)))
    }
}

/// File paths added, removed, or modified between two trees.
pub(crate) fn changed_paths(
    repository: &Repository,
    old_tree: Option<Oid>,
    new_tree: Oid,
) -> Result<Vec<String>> {
    let new = tree::flatten(repository.store(), new_tree)?;
    let old = match old_tree {
        Some(oid) => tree::flatten(repository.store(), oid)?.files,
        None => BTreeMap::new(),
    };

    let mut touched = Vec::new();
    for (path, oid) in &new.files {
        if old.get(path) != Some(oid) {
            touched.push(path.clone());
        }
    }
    for path in old.keys() {
        if !new.files.contains_key(path) {
            touched.push(path.clone());
        }
    }
    Ok(touched)
}

/// Render an addition as the upsert change `diff` reports.
pub(crate) fn upsert_change(path: &FilePath, text: &str) -> Result<Change> {
    let content = if path.is_json() {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => ChangeContent::UpsertJson(value),
            Err(_) => ChangeContent::UpsertText(text.to_owned()),
        }
    } else {
        ChangeContent::UpsertText(text.to_owned())
    };
    Ok(Change {
        path: path.clone(),
        content,
    })
}

/// Render a modification as the patch change `diff` reports: a JSON patch
/// for JSON entries, a unified text patch otherwise.
pub(crate) fn modification_change(path: &FilePath, old: &str, new: &str) -> Result<Change> {
    if path.is_json() {
        if let (Ok(old_value), Ok(new_value)) = (
            serde_json::from_str::<Value>(old),
            serde_json::from_str::<Value>(new),
        ) {
            return Ok(Change {
                path: path.clone(),
                content: ChangeContent::ApplyJsonPatch(diff_json(&old_value, &new_value)),
            });
        }
    }
    Ok(Change {
        path: path.clone(),
        content: ChangeContent::ApplyTextPatch(diff_text(old, new)),
    })
}
