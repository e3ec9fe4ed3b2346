//! Store-to-store migration.
//!
//! Copies every object reachable from every ref of `src` into `dst`, then
//! the refs themselves. Because both backends address objects by the hash
//! of the plaintext git-format object, every OID — and therefore every
//! revision ref — is preserved verbatim. Used when converting a plaintext
//! repository to an encrypted one.

use std::collections::HashSet;

use tracing::debug;

use crate::error::StoreError;
use crate::store::ObjectStore;
use crate::types::{Expectation, NodeKind, Oid, RefName, TreeEdit, TreeEntry};

/// Copy all reachable objects and all refs from `src` into `dst`.
///
/// Returns the number of commits copied. Idempotent: objects already
/// present in `dst` are deduplicated by content addressing, and refs are
/// overwritten to match `src`.
pub fn migrate_store(src: &dyn ObjectStore, dst: &dyn ObjectStore) -> Result<usize, StoreError> {
    let refs = src.list_refs("refs/")?;
    let mut seen_commits: HashSet<Oid> = HashSet::new();
    let mut seen_blobs: HashSet<Oid> = HashSet::new();

    for (name, tip) in &refs {
        debug!(r#ref = %name, oid = %tip, "migrating ref");
        let mut pending = vec![*tip];
        while let Some(oid) = pending.pop() {
            if !seen_commits.insert(oid) {
                continue;
            }
            let commit = src.read_commit(oid)?;
            copy_tree(src, dst, commit.tree, &mut seen_blobs)?;
            pending.extend(commit.parents.iter().copied());
            let copied = dst.insert_commit(&commit)?;
            if copied != oid {
                return Err(StoreError::Backend {
                    message: format!("commit {oid} copied with mismatched id {copied}"),
                });
            }
        }
    }

    for (name, tip) in &refs {
        dst.update_ref(name, *tip, Expectation::Any)?;
    }
    dst.set_symbolic_ref(
        &RefName::known("HEAD"),
        &RefName::known("refs/heads/master"),
    )?;

    Ok(seen_commits.len())
}

/// Copy the blobs under `tree`, then rebuild the tree object in `dst` and
/// verify the derived id matches.
fn copy_tree(
    src: &dyn ObjectStore,
    dst: &dyn ObjectStore,
    tree: Oid,
    seen_blobs: &mut HashSet<Oid>,
) -> Result<(), StoreError> {
    let entries = src.read_tree(tree)?;
    let mut edits = Vec::new();
    collect_edits(src, dst, &entries, String::new(), seen_blobs, &mut edits)?;

    let rebuilt = dst.insert_tree(None, &edits)?;
    if rebuilt != tree {
        return Err(StoreError::Backend {
            message: format!("tree {tree} rebuilt with mismatched id {rebuilt}"),
        });
    }
    Ok(())
}

fn collect_edits(
    src: &dyn ObjectStore,
    dst: &dyn ObjectStore,
    entries: &[TreeEntry],
    prefix: String,
    seen_blobs: &mut HashSet<Oid>,
    edits: &mut Vec<TreeEdit>,
) -> Result<(), StoreError> {
    for entry in entries {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        match entry.kind {
            NodeKind::Blob => {
                if seen_blobs.insert(entry.oid) {
                    let data = src.read_blob(entry.oid)?;
                    let copied = dst.insert_blob(&data)?;
                    if copied != entry.oid {
                        return Err(StoreError::Backend {
                            message: format!(
                                "blob {} copied with mismatched id {copied}",
                                entry.oid
                            ),
                        });
                    }
                }
                edits.push(TreeEdit::Upsert {
                    path,
                    oid: entry.oid,
                });
            }
            NodeKind::Tree => {
                let children = src.read_tree(entry.oid)?;
                collect_edits(src, dst, &children, path, seen_blobs, edits)?;
            }
        }
    }
    Ok(())
}
