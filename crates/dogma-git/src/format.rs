//! Canonical git object serialization for the key-value backend.
//!
//! The key-value backend addresses objects by the SHA-1 of the plaintext
//! git-format object (`"<kind> <len>\0" + body`), so an [`Oid`] minted here
//! is byte-identical to the one the gix backend would produce for the same
//! content. That is what keeps revision refs and commit ids stable across a
//! migration between backends.

use sha1::{Digest, Sha1};

use crate::error::StoreError;
use crate::types::{CommitRecord, Identity, NodeKind, Oid, TreeEntry};

// ---------------------------------------------------------------------------
// Object kinds
// ---------------------------------------------------------------------------

/// The three object kinds dogma stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub(crate) const fn header_name(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub(crate) const fn tag(self) -> u8 {
        match self {
            Self::Blob => b'b',
            Self::Tree => b't',
            Self::Commit => b'c',
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            b'b' => Ok(Self::Blob),
            b't' => Ok(Self::Tree),
            b'c' => Ok(Self::Commit),
            other => Err(StoreError::Backend {
                message: format!("unknown object kind tag {other:#x}"),
            }),
        }
    }
}

/// Compute the git object id of `body` as an object of `kind`.
pub(crate) fn object_id(kind: ObjectKind, body: &[u8]) -> Oid {
    let mut hasher = Sha1::new();
    hasher.update(kind.header_name().as_bytes());
    hasher.update(b" ");
    hasher.update(body.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    Oid::from_bytes(hasher.finalize().into())
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

const MODE_BLOB: &[u8] = b"100644";
const MODE_TREE: &[u8] = b"40000";

/// Serialize tree entries into the git binary tree format.
///
/// Entries are sorted in git tree order: byte-wise by name, with directory
/// names comparing as if they carried a trailing `/`.
pub(crate) fn serialize_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| tree_order_key(a).cmp(&tree_order_key(b)));

    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(match entry.kind {
            NodeKind::Blob => MODE_BLOB,
            NodeKind::Tree => MODE_TREE,
        });
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.oid.as_bytes());
    }
    out
}

fn tree_order_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.clone().into_bytes();
    if entry.kind == NodeKind::Tree {
        key.push(b'/');
    }
    key
}

/// Parse the git binary tree format.
pub(crate) fn parse_tree(body: &[u8]) -> Result<Vec<TreeEntry>, StoreError> {
    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("tree entry missing mode separator"))?;
        let mode = &rest[..space];
        let kind = match mode {
            m if m == MODE_BLOB => NodeKind::Blob,
            m if m == MODE_TREE => NodeKind::Tree,
            other => {
                return Err(malformed(format!(
                    "unsupported tree entry mode {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| malformed("tree entry missing name terminator"))?;
        let name = String::from_utf8(rest[..nul].to_vec())
            .map_err(|_| malformed("tree entry name is not UTF-8"))?;
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(malformed("tree entry truncated before oid"));
        }
        let mut oid_bytes = [0u8; 20];
        oid_bytes.copy_from_slice(&rest[..20]);
        rest = &rest[20..];

        entries.push(TreeEntry {
            name,
            kind,
            oid: Oid::from_bytes(oid_bytes),
        });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// Serialize a commit into the git text format.
pub(crate) fn serialize_commit(record: &CommitRecord) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("tree {}\n", record.tree));
    for parent in &record.parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str(&format!("author {}\n", identity_line(&record.author)));
    out.push_str(&format!("committer {}\n", identity_line(&record.committer)));
    out.push('\n');
    out.push_str(&record.message);
    out.into_bytes()
}

fn identity_line(identity: &Identity) -> String {
    format!(
        "{} <{}> {} +0000",
        identity.name, identity.email, identity.seconds
    )
}

/// Parse the git commit text format.
pub(crate) fn parse_commit(body: &[u8]) -> Result<CommitRecord, StoreError> {
    let text =
        std::str::from_utf8(body).map_err(|_| malformed("commit object is not UTF-8"))?;
    let (header, message) = text
        .split_once("\n\n")
        .ok_or_else(|| malformed("commit object missing header/message separator"))?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    for line in header.lines() {
        if let Some(hex) = line.strip_prefix("tree ") {
            tree = Some(parse_oid(hex)?);
        } else if let Some(hex) = line.strip_prefix("parent ") {
            parents.push(parse_oid(hex)?);
        } else if let Some(rest) = line.strip_prefix("author ") {
            author = Some(parse_identity(rest)?);
        } else if let Some(rest) = line.strip_prefix("committer ") {
            committer = Some(parse_identity(rest)?);
        }
        // Unknown headers (gpgsig, encoding) are tolerated and dropped.
    }

    Ok(CommitRecord {
        tree: tree.ok_or_else(|| malformed("commit object missing tree header"))?,
        parents,
        author: author.ok_or_else(|| malformed("commit object missing author header"))?,
        committer: committer
            .ok_or_else(|| malformed("commit object missing committer header"))?,
        message: message.to_owned(),
    })
}

fn parse_oid(hex: &str) -> Result<Oid, StoreError> {
    hex.parse().map_err(|e: crate::types::OidParseError| StoreError::InvalidOid {
        value: hex.to_owned(),
        reason: e.reason,
    })
}

/// Parse `Name <email> seconds offset`.
fn parse_identity(line: &str) -> Result<Identity, StoreError> {
    let open = line
        .find('<')
        .ok_or_else(|| malformed("identity missing '<'"))?;
    let close = line
        .find('>')
        .ok_or_else(|| malformed("identity missing '>'"))?;
    if close < open {
        return Err(malformed("identity has '>' before '<'"));
    }
    let name = line[..open].trim().to_owned();
    let email = line[open + 1..close].to_owned();
    let mut fields = line[close + 1..].split_whitespace();
    let seconds = fields
        .next()
        .ok_or_else(|| malformed("identity missing timestamp"))?
        .parse::<i64>()
        .map_err(|_| malformed("identity timestamp is not an integer"))?;
    Ok(Identity {
        name,
        email,
        seconds,
    })
}

fn malformed(message: impl Into<String>) -> StoreError {
    StoreError::Backend {
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_id_matches_git() {
        // `echo -n 'hello' | git hash-object --stdin`
        let oid = object_id(ObjectKind::Blob, b"hello");
        assert_eq!(oid.to_string(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
    }

    #[test]
    fn empty_tree_id_matches_git() {
        let oid = object_id(ObjectKind::Tree, &serialize_tree(&[]));
        assert_eq!(oid.to_string(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[test]
    fn tree_roundtrip() {
        let entries = vec![
            TreeEntry {
                name: "b.txt".to_owned(),
                kind: NodeKind::Blob,
                oid: Oid::from_bytes([1; 20]),
            },
            TreeEntry {
                name: "a".to_owned(),
                kind: NodeKind::Tree,
                oid: Oid::from_bytes([2; 20]),
            },
        ];
        let body = serialize_tree(&entries);
        let parsed = parse_tree(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        // Git tree order: "a/" sorts before "b.txt".
        assert_eq!(parsed[0].name, "a");
        assert_eq!(parsed[1].name, "b.txt");
    }

    #[test]
    fn tree_orders_directory_after_similar_file() {
        // "a.txt" < "a/" in git tree order because '.' (0x2e) < '/' (0x2f).
        let entries = vec![
            TreeEntry {
                name: "a".to_owned(),
                kind: NodeKind::Tree,
                oid: Oid::from_bytes([2; 20]),
            },
            TreeEntry {
                name: "a.txt".to_owned(),
                kind: NodeKind::Blob,
                oid: Oid::from_bytes([1; 20]),
            },
        ];
        let parsed = parse_tree(&serialize_tree(&entries)).unwrap();
        assert_eq!(parsed[0].name, "a.txt");
        assert_eq!(parsed[1].name, "a");
    }

    #[test]
    fn commit_roundtrip() {
        let record = CommitRecord {
            tree: Oid::from_bytes([3; 20]),
            parents: vec![Oid::from_bytes([4; 20])],
            author: Identity {
                name: "Alice".to_owned(),
                email: "alice@example.com".to_owned(),
                seconds: 1_700_000_000,
            },
            committer: Identity {
                name: "Alice".to_owned(),
                email: "alice@example.com".to_owned(),
                seconds: 1_700_000_000,
            },
            message: "{\"summary\":\"s\",\"detail\":\"\",\"markup\":\"PLAINTEXT\",\"revision\":2}"
                .to_owned(),
        };
        let body = serialize_commit(&record);
        let parsed = parse_commit(&body).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn commit_without_parents_roundtrip() {
        let record = CommitRecord {
            tree: Oid::from_bytes([3; 20]),
            parents: vec![],
            author: Identity {
                name: "System".to_owned(),
                email: "system@localhost".to_owned(),
                seconds: 0,
            },
            committer: Identity {
                name: "System".to_owned(),
                email: "system@localhost".to_owned(),
                seconds: 0,
            },
            message: "initial".to_owned(),
        };
        let parsed = parse_commit(&serialize_commit(&record)).unwrap();
        assert_eq!(parsed.parents, Vec::<Oid>::new());
        assert_eq!(parsed, record);
    }
}
