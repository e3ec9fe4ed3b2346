//! Tree walking: path lookup, full flattening, and content loading.
//!
//! Trees are immutable snapshots addressed by OID, so everything here runs
//! lock-free against the object store and stays consistent even while a
//! commit is in flight.

use std::collections::{BTreeMap, BTreeSet};

use dogma_git::{NodeKind, ObjectStore, Oid};

use crate::error::{Error, Result};
use crate::model::EntryContent;
use crate::path::FilePath;

/// What a path resolves to inside a tree.
pub(crate) enum Node {
    File(Oid),
    Directory(Oid),
}

/// Resolve `path` inside the tree rooted at `root`.
pub(crate) fn lookup(store: &dyn ObjectStore, root: Oid, path: &FilePath) -> Result<Option<Node>> {
    if path.is_root() {
        return Ok(Some(Node::Directory(root)));
    }
    let mut current = root;
    let mut segments = path.tree_path().split('/').peekable();
    while let Some(segment) = segments.next() {
        let entries = store.read_tree(current)?;
        let Some(entry) = entries.iter().find(|e| e.name == segment) else {
            return Ok(None);
        };
        match (entry.kind, segments.peek().is_some()) {
            (NodeKind::Blob, false) => return Ok(Some(Node::File(entry.oid))),
            (NodeKind::Tree, false) => return Ok(Some(Node::Directory(entry.oid))),
            (NodeKind::Tree, true) => current = entry.oid,
            (NodeKind::Blob, true) => return Ok(None),
        }
    }
    Ok(None)
}

/// A flattened tree: every file path mapped to its blob, plus the set of
/// directory paths (the root `/` excluded).
pub(crate) struct TreeIndex {
    pub(crate) files: BTreeMap<String, Oid>,
    pub(crate) directories: BTreeSet<String>,
}

/// Flatten the tree rooted at `root` into absolute paths.
pub(crate) fn flatten(store: &dyn ObjectStore, root: Oid) -> Result<TreeIndex> {
    let mut index = TreeIndex {
        files: BTreeMap::new(),
        directories: BTreeSet::new(),
    };
    flatten_into(store, root, "", &mut index)?;
    Ok(index)
}

fn flatten_into(
    store: &dyn ObjectStore,
    tree: Oid,
    prefix: &str,
    index: &mut TreeIndex,
) -> Result<()> {
    for entry in store.read_tree(tree)? {
        let path = format!("{prefix}/{}", entry.name);
        match entry.kind {
            NodeKind::Blob => {
                index.files.insert(path, entry.oid);
            }
            NodeKind::Tree => {
                index.directories.insert(path.clone());
                flatten_into(store, entry.oid, &path, index)?;
            }
        }
    }
    Ok(())
}

/// Load and type a file's content: `.json` paths parse as JSON (falling
/// back to text for foreign files that do not parse), everything else is
/// UTF-8 text.
pub(crate) fn load_content(
    store: &dyn ObjectStore,
    path: &FilePath,
    oid: Oid,
) -> Result<EntryContent> {
    let bytes = store.read_blob(oid)?;
    let text = String::from_utf8(bytes).map_err(|_| {
        Error::StorageFailed(dogma_git::StoreError::Backend {
            message: format!("entry {path} is not valid UTF-8"),
        })
    })?;
    if path.is_json() {
        if let Ok(value) = serde_json::from_str(&text) {
            return Ok(EntryContent::Json(value));
        }
    }
    Ok(EntryContent::Text(text))
}

/// Load a file's raw text without JSON typing, for diffing and patching.
pub(crate) fn load_text(store: &dyn ObjectStore, path: &FilePath, oid: Oid) -> Result<String> {
    let bytes = store.read_blob(oid)?;
    String::from_utf8(bytes).map_err(|_| {
        Error::StorageFailed(dogma_git::StoreError::Backend {
            message: format!("entry {path} is not valid UTF-8"),
        })
    })
}
