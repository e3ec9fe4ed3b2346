//! gix-backed object read/write and tree derivation.

use crate::error::StoreError;
use crate::gix_store::GixStore;
use crate::types::{CommitRecord, Identity, NodeKind, Oid, TreeEdit, TreeEntry};

/// Convert our `Oid` to a `gix::ObjectId`.
pub(crate) fn to_gix_oid(oid: Oid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

/// Convert a `gix::ObjectId` to our `Oid`.
pub(crate) fn from_gix_oid(oid: gix::ObjectId) -> Result<Oid, StoreError> {
    let bytes: [u8; 20] = oid
        .as_bytes()
        .try_into()
        .map_err(|_| StoreError::InvalidOid {
            value: oid.to_string(),
            reason: "expected a 20-byte SHA-1 object id".to_owned(),
        })?;
    Ok(Oid::from_bytes(bytes))
}

fn to_signature(identity: &Identity) -> gix::actor::Signature {
    gix::actor::Signature {
        name: identity.name.clone().into(),
        email: identity.email.clone().into(),
        time: gix::date::Time {
            seconds: identity.seconds,
            offset: 0,
        },
    }
}

pub fn insert_blob(store: &GixStore, data: &[u8]) -> Result<Oid, StoreError> {
    let repo = store.local();
    let id = repo.write_blob(data).map_err(|e| StoreError::Backend {
        message: format!("failed to write blob: {e}"),
    })?;
    from_gix_oid(id.detach())
}

pub fn insert_tree(
    store: &GixStore,
    base: Option<Oid>,
    edits: &[TreeEdit],
) -> Result<Oid, StoreError> {
    let repo = store.local();
    let base_id = match base {
        Some(oid) => to_gix_oid(oid),
        None => repo
            .write_object(&gix::objs::Tree::empty())
            .map_err(|e| StoreError::Backend {
                message: format!("failed to write empty tree: {e}"),
            })?
            .detach(),
    };
    let tree = repo.find_tree(base_id).map_err(|e| StoreError::ObjectNotFound {
        message: format!("base tree {base_id}: {e}"),
    })?;

    let mut editor = tree.edit().map_err(|e| StoreError::Backend {
        message: format!("failed to create tree editor: {e}"),
    })?;

    for edit in edits {
        match edit {
            TreeEdit::Upsert { path, oid } => {
                editor
                    .upsert(
                        path.as_str(),
                        gix::objs::tree::EntryKind::Blob,
                        to_gix_oid(*oid),
                    )
                    .map_err(|e| StoreError::Backend {
                        message: format!("tree edit upsert '{path}': {e}"),
                    })?;
            }
            TreeEdit::Remove { path } => {
                editor.remove(path.as_str()).map_err(|e| StoreError::Backend {
                    message: format!("tree edit remove '{path}': {e}"),
                })?;
            }
        }
    }

    let new_id = editor.write().map_err(|e| StoreError::Backend {
        message: format!("failed to write derived tree: {e}"),
    })?;
    from_gix_oid(new_id.detach())
}

pub fn insert_commit(store: &GixStore, record: &CommitRecord) -> Result<Oid, StoreError> {
    let repo = store.local();
    let commit = gix::objs::Commit {
        message: record.message.clone().into(),
        tree: to_gix_oid(record.tree),
        author: to_signature(&record.author),
        committer: to_signature(&record.committer),
        encoding: None,
        parents: record.parents.iter().map(|p| to_gix_oid(*p)).collect(),
        extra_headers: Vec::new(),
    };
    let id = repo.write_object(&commit).map_err(|e| StoreError::Backend {
        message: format!("failed to write commit object: {e}"),
    })?;
    from_gix_oid(id.detach())
}

pub fn read_blob(store: &GixStore, oid: Oid) -> Result<Vec<u8>, StoreError> {
    let repo = store.local();
    let mut blob = repo
        .find_blob(to_gix_oid(oid))
        .map_err(|e| StoreError::ObjectNotFound {
            message: format!("blob {oid}: {e}"),
        })?;
    Ok(blob.take_data())
}

pub fn read_tree(store: &GixStore, oid: Oid) -> Result<Vec<TreeEntry>, StoreError> {
    let repo = store.local();
    let tree = repo
        .find_tree(to_gix_oid(oid))
        .map_err(|e| StoreError::ObjectNotFound {
            message: format!("tree {oid}: {e}"),
        })?;

    let mut entries = Vec::new();
    for result in tree.iter() {
        let entry = result.map_err(|e| StoreError::Backend {
            message: format!("failed to decode tree entry: {e}"),
        })?;
        let kind = match entry.inner.mode.kind() {
            gix::objs::tree::EntryKind::Tree => NodeKind::Tree,
            gix::objs::tree::EntryKind::Blob | gix::objs::tree::EntryKind::BlobExecutable => {
                NodeKind::Blob
            }
            gix::objs::tree::EntryKind::Link | gix::objs::tree::EntryKind::Commit => {
                return Err(StoreError::Backend {
                    message: format!(
                        "unsupported tree entry kind for '{}' in tree {oid}",
                        entry.inner.filename
                    ),
                });
            }
        };
        entries.push(TreeEntry {
            name: entry.inner.filename.to_string(),
            kind,
            oid: from_gix_oid(entry.inner.oid.into())?,
        });
    }
    Ok(entries)
}

pub fn read_commit(store: &GixStore, oid: Oid) -> Result<CommitRecord, StoreError> {
    let repo = store.local();
    let commit = repo
        .find_commit(to_gix_oid(oid))
        .map_err(|e| StoreError::ObjectNotFound {
            message: format!("commit {oid}: {e}"),
        })?;

    let seconds = commit
        .time()
        .map_err(|e| StoreError::Backend {
            message: format!("failed to parse commit {oid} time: {e}"),
        })?
        .seconds;

    let decoded = commit.decode().map_err(|e| StoreError::Backend {
        message: format!("failed to decode commit {oid}: {e}"),
    })?;

    let tree = from_gix_oid(decoded.tree())?;
    let parents = decoded
        .parents()
        .map(from_gix_oid)
        .collect::<Result<Vec<_>, _>>()?;
    let message = decoded.message.to_string();

    let author_sig = decoded.author();
    let committer_sig = decoded.committer();
    let author = Identity {
        name: author_sig.name.to_string(),
        email: author_sig.email.to_string(),
        seconds,
    };
    let committer = Identity {
        name: committer_sig.name.to_string(),
        email: committer_sig.email.to_string(),
        seconds,
    };

    Ok(CommitRecord {
        tree,
        parents,
        author,
        committer,
        message,
    })
}
