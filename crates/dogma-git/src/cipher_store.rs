//! The encrypted key-value implementation of [`ObjectStore`].
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//! ├── dek.json          ← DEK wrapped by the process KEK, with key version
//! ├── refs.json         ← direct + symbolic refs, rewritten atomically
//! └── objects/
//!     └── aa/bbcc…      ← one sealed record per object, loose-object fan-out
//! ```
//!
//! Every record is `[key_version u32 LE][kind u8][nonce][ciphertext]` where
//! the ciphertext is the plaintext git-format object body sealed with the
//! repository DEK (AAD = object id hex). Object identity is the SHA-1 of
//! the plaintext, so sealing — and later re-sealing under a rotated key
//! version — never changes an [`Oid`] or the bytes a reader observes.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::crypto::{Dek, Kek, SealedBox, WrappedDek};
use crate::error::StoreError;
use crate::format::{self, ObjectKind};
use crate::store::ObjectStore;
use crate::types::{CommitRecord, Expectation, NodeKind, Oid, RefName, TreeEdit, TreeEntry};

const DEK_FILE: &str = "dek.json";
const REFS_FILE: &str = "refs.json";
const OBJECTS_DIR: &str = "objects";
const NONCE_LEN: usize = 12;
const RECORD_HEADER_LEN: usize = 4 + 1 + NONCE_LEN;

// ---------------------------------------------------------------------------
// Ref table
// ---------------------------------------------------------------------------

/// The on-disk form of `refs.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RefTable {
    /// Direct refs: full name → OID hex.
    refs: BTreeMap<String, String>,
    /// Symbolic refs: full name → target ref name (in practice only HEAD).
    symbolic: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// CipherStore
// ---------------------------------------------------------------------------

/// An [`ObjectStore`] that seals every object with a per-repository DEK.
pub struct CipherStore {
    root: PathBuf,
    dek: Dek,
    key_version: RwLock<u32>,
    refs: Mutex<RefTable>,
}

impl CipherStore {
    /// Create a new encrypted store at `root`, generating a fresh DEK
    /// wrapped by `kek`, and point `HEAD` at `refs/heads/master`.
    pub fn create(root: &Path, kek: &Kek) -> Result<Self, StoreError> {
        fs::create_dir_all(root.join(OBJECTS_DIR))?;

        let dek = Dek::generate()?;
        let wrapped = WrappedDek::wrap(&dek, kek)?;
        write_json_atomic(&root.join(DEK_FILE), &wrapped)?;

        let mut table = RefTable::default();
        table
            .symbolic
            .insert("HEAD".to_owned(), "refs/heads/master".to_owned());
        write_json_atomic(&root.join(REFS_FILE), &table)?;

        Ok(Self {
            root: root.to_path_buf(),
            dek,
            key_version: RwLock::new(kek.version()),
            refs: Mutex::new(table),
        })
    }

    /// Open an existing encrypted store, unwrapping its DEK with `kek`.
    pub fn open(root: &Path, kek: &Kek) -> Result<Self, StoreError> {
        let wrapped: WrappedDek = read_json(&root.join(DEK_FILE))?;
        let dek = wrapped.unwrap_with(kek)?;
        let table: RefTable = read_json(&root.join(REFS_FILE))?;
        Ok(Self {
            root: root.to_path_buf(),
            dek,
            key_version: RwLock::new(wrapped.key_version),
            refs: Mutex::new(table),
        })
    }

    /// The key version objects are currently sealed under.
    #[must_use]
    pub fn key_version(&self) -> u32 {
        *self.key_version.read()
    }

    /// Re-wrap the DEK under `new_kek` and persist it.
    ///
    /// Object records keep their previous key-version stamp until
    /// [`reseal`](Self::reseal) runs; their ciphertext, ids, and plaintext
    /// are untouched either way.
    pub fn rotate_dek(&self, new_kek: &Kek) -> Result<(), StoreError> {
        let mut version = self.key_version.write();
        if new_kek.version() <= *version {
            return Err(StoreError::Cipher {
                message: format!(
                    "refusing to rotate DEK to key version {} (current is {})",
                    new_kek.version(),
                    *version
                ),
            });
        }
        let wrapped = WrappedDek::wrap(&self.dek, new_kek)?;
        write_json_atomic(&self.root.join(DEK_FILE), &wrapped)?;
        *version = new_kek.version();
        tracing::info!(key_version = new_kek.version(), "rotated repository DEK");
        Ok(())
    }

    /// Re-seal every object record under the current key version.
    ///
    /// Plaintext is decrypted and sealed again with a fresh nonce; object
    /// ids and plaintext bytes are unchanged, only the record metadata
    /// (key version, nonce, ciphertext bytes) differs afterwards.
    pub fn reseal(&self) -> Result<usize, StoreError> {
        let version = *self.key_version.read();
        let mut count = 0usize;
        for oid in self.list_objects()? {
            let (kind, body) = self.get_object_any(oid)?;
            self.write_record(oid, kind, &body, version)?;
            count += 1;
        }
        tracing::info!(count, key_version = version, "re-sealed object records");
        Ok(count)
    }

    /// The key version stamped on one object's record.
    pub fn object_key_version(&self, oid: Oid) -> Result<u32, StoreError> {
        let raw = fs::read(self.object_path(oid)).map_err(|e| StoreError::ObjectNotFound {
            message: format!("object {oid}: {e}"),
        })?;
        if raw.len() < RECORD_HEADER_LEN {
            return Err(StoreError::Backend {
                message: format!("object record {oid} is truncated"),
            });
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&raw[..4]);
        Ok(u32::from_le_bytes(version_bytes))
    }

    /// Enumerate every object id in the store.
    pub fn list_objects(&self) -> Result<Vec<Oid>, StoreError> {
        let mut out = Vec::new();
        let objects = self.root.join(OBJECTS_DIR);
        for fan in fs::read_dir(&objects)? {
            let fan = fan?;
            if !fan.file_type()?.is_dir() {
                continue;
            }
            let prefix = fan.file_name().to_string_lossy().into_owned();
            for file in fs::read_dir(fan.path())? {
                let file = file?;
                let rest = file.file_name().to_string_lossy().into_owned();
                let hex = format!("{prefix}{rest}");
                // Anything that isn't a 40-hex name (e.g. an abandoned
                // temp file from a torn write) is not an object record.
                if let Ok(oid) = hex.parse::<Oid>() {
                    out.push(oid);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Record I/O
    // -----------------------------------------------------------------------

    fn object_path(&self, oid: Oid) -> PathBuf {
        let hex = oid.to_string();
        self.root.join(OBJECTS_DIR).join(&hex[..2]).join(&hex[2..])
    }

    fn put_object(&self, kind: ObjectKind, body: &[u8]) -> Result<Oid, StoreError> {
        let oid = format::object_id(kind, body);
        let path = self.object_path(oid);
        if path.exists() {
            // Content-addressed: an existing record already holds these bytes.
            return Ok(oid);
        }
        self.write_record(oid, kind, body, *self.key_version.read())?;
        Ok(oid)
    }

    fn write_record(
        &self,
        oid: Oid,
        kind: ObjectKind,
        body: &[u8],
        version: u32,
    ) -> Result<(), StoreError> {
        let sealed = self.dek.seal(oid.to_string().as_bytes(), body)?;
        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + sealed.ciphertext.len());
        record.extend_from_slice(&version.to_le_bytes());
        record.push(kind.tag());
        record.extend_from_slice(&sealed.nonce);
        record.extend_from_slice(&sealed.ciphertext);

        let path = self.object_path(oid);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, &record)
    }

    fn get_object(&self, oid: Oid, want: ObjectKind) -> Result<Vec<u8>, StoreError> {
        let (kind, body) = self.get_object_any(oid)?;
        if kind != want {
            return Err(StoreError::ObjectNotFound {
                message: format!(
                    "object {oid} is a {}, expected a {}",
                    kind.header_name(),
                    want.header_name()
                ),
            });
        }
        Ok(body)
    }

    fn get_object_any(&self, oid: Oid) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let raw = fs::read(self.object_path(oid)).map_err(|e| StoreError::ObjectNotFound {
            message: format!("object {oid}: {e}"),
        })?;
        if raw.len() < RECORD_HEADER_LEN {
            return Err(StoreError::Backend {
                message: format!("object record {oid} is truncated"),
            });
        }
        let kind = ObjectKind::from_tag(raw[4])?;
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&raw[5..5 + NONCE_LEN]);
        let sealed = SealedBox {
            nonce,
            ciphertext: raw[RECORD_HEADER_LEN..].to_vec(),
        };
        let body = self.dek.open(oid.to_string().as_bytes(), &sealed)?;
        Ok((kind, body))
    }

    // -----------------------------------------------------------------------
    // Nested tree model
    // -----------------------------------------------------------------------

    fn load_dir(&self, oid: Oid) -> Result<BTreeMap<String, Node>, StoreError> {
        let entries = format::parse_tree(&self.get_object(oid, ObjectKind::Tree)?)?;
        let mut map = BTreeMap::new();
        for entry in entries {
            let node = match entry.kind {
                NodeKind::Blob => Node::File(entry.oid),
                NodeKind::Tree => Node::Dir(self.load_dir(entry.oid)?),
            };
            map.insert(entry.name, node);
        }
        Ok(map)
    }

    fn store_dir(&self, dir: &BTreeMap<String, Node>) -> Result<Oid, StoreError> {
        let mut entries = Vec::new();
        for (name, node) in dir {
            match node {
                Node::File(oid) => entries.push(TreeEntry {
                    name: name.clone(),
                    kind: NodeKind::Blob,
                    oid: *oid,
                }),
                Node::Dir(children) => {
                    // Directories emptied by removals vanish entirely.
                    if children.is_empty() {
                        continue;
                    }
                    entries.push(TreeEntry {
                        name: name.clone(),
                        kind: NodeKind::Tree,
                        oid: self.store_dir(children)?,
                    });
                }
            }
        }
        self.put_object(ObjectKind::Tree, &format::serialize_tree(&entries))
    }

    fn persist_refs(&self, table: &RefTable) -> Result<(), StoreError> {
        write_json_atomic(&self.root.join(REFS_FILE), table)
    }
}

/// A node in the in-memory nested tree used while applying edits.
enum Node {
    File(Oid),
    Dir(BTreeMap<String, Node>),
}

fn upsert_path(dir: &mut BTreeMap<String, Node>, path: &str, oid: Oid) {
    match path.split_once('/') {
        None => {
            dir.insert(path.to_owned(), Node::File(oid));
        }
        Some((head, rest)) => {
            let child = dir
                .entry(head.to_owned())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            if let Node::File(_) = child {
                *child = Node::Dir(BTreeMap::new());
            }
            if let Node::Dir(children) = child {
                upsert_path(children, rest, oid);
            }
        }
    }
}

fn remove_path(dir: &mut BTreeMap<String, Node>, path: &str) {
    match path.split_once('/') {
        None => {
            dir.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Node::Dir(children)) = dir.get_mut(head) {
                remove_path(children, rest);
                if children.is_empty() {
                    dir.remove(head);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectStore impl
// ---------------------------------------------------------------------------

impl ObjectStore for CipherStore {
    fn insert_blob(&self, data: &[u8]) -> Result<Oid, StoreError> {
        self.put_object(ObjectKind::Blob, data)
    }

    fn insert_tree(&self, base: Option<Oid>, edits: &[TreeEdit]) -> Result<Oid, StoreError> {
        let mut root = match base {
            Some(oid) => self.load_dir(oid)?,
            None => BTreeMap::new(),
        };
        for edit in edits {
            match edit {
                TreeEdit::Upsert { path, oid } => upsert_path(&mut root, path, *oid),
                TreeEdit::Remove { path } => remove_path(&mut root, path),
            }
        }
        self.store_dir(&root)
    }

    fn insert_commit(&self, commit: &CommitRecord) -> Result<Oid, StoreError> {
        self.put_object(ObjectKind::Commit, &format::serialize_commit(commit))
    }

    fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, StoreError> {
        self.get_object(oid, ObjectKind::Blob)
    }

    fn read_tree(&self, oid: Oid) -> Result<Vec<TreeEntry>, StoreError> {
        format::parse_tree(&self.get_object(oid, ObjectKind::Tree)?)
    }

    fn read_commit(&self, oid: Oid) -> Result<CommitRecord, StoreError> {
        format::parse_commit(&self.get_object(oid, ObjectKind::Commit)?)
    }

    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, StoreError> {
        let table = self.refs.lock();
        let resolved = match table.symbolic.get(name.as_str()) {
            Some(target) => table.refs.get(target),
            None => table.refs.get(name.as_str()),
        };
        match resolved {
            Some(hex) => {
                let oid = hex
                    .parse()
                    .map_err(|e: crate::types::OidParseError| StoreError::InvalidOid {
                        value: hex.clone(),
                        reason: e.reason,
                    })?;
                Ok(Some(oid))
            }
            None => Ok(None),
        }
    }

    fn update_ref(
        &self,
        name: &RefName,
        new: Oid,
        expected: Expectation,
    ) -> Result<(), StoreError> {
        let mut table = self.refs.lock();
        let current = table.refs.get(name.as_str()).cloned();
        match (expected, &current) {
            (Expectation::MustNotExist, Some(oid)) => {
                return Err(StoreError::RefConflict {
                    ref_name: name.to_string(),
                    message: format!("ref already exists at {oid}"),
                });
            }
            (Expectation::MustMatch(want), Some(have)) if want.to_string() != *have => {
                return Err(StoreError::RefConflict {
                    ref_name: name.to_string(),
                    message: format!("expected {want}, found {have}"),
                });
            }
            (Expectation::MustMatch(want), None) => {
                return Err(StoreError::RefConflict {
                    ref_name: name.to_string(),
                    message: format!("expected {want}, found no ref"),
                });
            }
            _ => {}
        }
        table.refs.insert(name.as_str().to_owned(), new.to_string());
        self.persist_refs(&table)
    }

    fn set_symbolic_ref(&self, name: &RefName, target: &RefName) -> Result<(), StoreError> {
        let mut table = self.refs.lock();
        table
            .symbolic
            .insert(name.as_str().to_owned(), target.as_str().to_owned());
        self.persist_refs(&table)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, StoreError> {
        let table = self.refs.lock();
        let mut out = Vec::new();
        for (name, hex) in table.refs.range(prefix.to_owned()..) {
            if !name.starts_with(prefix) {
                break;
            }
            let ref_name = RefName::new(name).map_err(|e| StoreError::Backend {
                message: format!("unusable ref name in table: {e}"),
            })?;
            let oid = hex
                .parse()
                .map_err(|e: crate::types::OidParseError| StoreError::InvalidOid {
                    value: hex.clone(),
                    reason: e.reason,
                })?;
            out.push((ref_name, oid));
        }
        Ok(out)
    }

    fn rename_ref(&self, old: &RefName, new: &RefName) -> Result<(), StoreError> {
        let mut table = self.refs.lock();
        if table.refs.contains_key(new.as_str()) {
            return Err(StoreError::RefConflict {
                ref_name: new.to_string(),
                message: "rename target already exists".to_owned(),
            });
        }
        let Some(hex) = table.refs.remove(old.as_str()) else {
            return Err(StoreError::ObjectNotFound {
                message: format!("ref {old} does not exist"),
            });
        };
        table.refs.insert(new.as_str().to_owned(), hex);
        self.persist_refs(&table)
    }

    fn delete_ref(&self, name: &RefName) -> Result<(), StoreError> {
        let mut table = self.refs.lock();
        if table.refs.remove(name.as_str()).is_some() {
            self.persist_refs(&table)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Atomic file helpers
// ---------------------------------------------------------------------------

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Backend {
        message: format!("failed to serialize {}: {e}", path.display()),
    })?;
    write_atomic(path, &bytes)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Backend {
        message: format!("failed to parse {}: {e}", path.display()),
    })
}
