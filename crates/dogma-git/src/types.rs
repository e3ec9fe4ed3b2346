//! Core types for the dogma object-store layer.
//!
//! These types form the vocabulary shared between the [`ObjectStore`](crate::ObjectStore)
//! trait and the rest of dogma. They intentionally contain no gix types —
//! the backend is an implementation detail.

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Oid
// ---------------------------------------------------------------------------

/// The content address of a stored object (20-byte SHA-1).
///
/// Both backends hash the plaintext git-format object, so an `Oid` names
/// the same content no matter which backend stores it — that is what lets
/// revision refs survive a backend migration untouched. The all-zero id
/// never names a stored object; it exists only as the "no such ref"
/// sentinel in compare-and-set reporting.
///
/// The text form is 40 hex digits. Parsing accepts either case (some
/// external tooling emits uppercase); display is always lowercase.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Oid([u8; 20]);

impl Oid {
    /// The all-zero sentinel id.
    pub const ZERO: Self = Self([0; 20]);

    /// Wrap raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// `true` for the sentinel id.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 20]
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 40 || !s.is_ascii() {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!(
                    "an object id is exactly 40 hex digits, got {} bytes",
                    s.len()
                ),
            });
        }
        let mut bytes = [0u8; 20];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let offset = i * 2;
            *slot = u8::from_str_radix(&s[offset..offset + 2], 16).map_err(|_| {
                OidParseError {
                    value: s.to_owned(),
                    reason: format!("non-hex digit near offset {offset}"),
                }
            })?;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing an object-id string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The rejected input.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparsable object id {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

// ---------------------------------------------------------------------------
// RefName
// ---------------------------------------------------------------------------

/// A validated ref name.
///
/// Must start with `refs/` or be exactly `HEAD` (the only bare ref dogma
/// ever touches — it stays a symbolic pointer to `refs/heads/master`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Create a new `RefName`, validating that it looks like a ref.
    ///
    /// # Errors
    /// Returns an error if the name is empty, contains whitespace or `..`,
    /// or neither starts with `refs/` nor is `HEAD`.
    pub fn new(name: &str) -> Result<Self, RefNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// Return the ref name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct a well-known ref name that is valid by construction.
    pub(crate) fn known(name: &'static str) -> Self {
        Self(name.to_owned())
    }

    fn validate(name: &str) -> Result<(), RefNameError> {
        if name.is_empty() {
            return Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must not be empty".to_owned(),
            });
        }
        if name.contains("..") || name.chars().any(char::is_whitespace) {
            return Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must not contain '..' or whitespace".to_owned(),
            });
        }
        if name.starts_with("refs/") || name == "HEAD" {
            Ok(())
        } else {
            Err(RefNameError {
                value: name.to_owned(),
                reason: "ref name must start with 'refs/' or be HEAD".to_owned(),
            })
        }
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RefName {
    type Err = RefNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`RefName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for RefNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ref name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for RefNameError {}

// ---------------------------------------------------------------------------
// Ref update expectations
// ---------------------------------------------------------------------------

/// The expected current value of a ref in a compare-and-set update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation {
    /// The ref must not exist yet; the update creates it.
    MustNotExist,
    /// The ref must currently point at this OID.
    MustMatch(Oid),
    /// No expectation; create or overwrite unconditionally.
    Any,
}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The kind of node a tree entry points to.
///
/// dogma stores only regular files and directories; executables, symlinks,
/// and submodules never occur in a configuration repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Regular file (`100644`).
    Blob,
    /// Subdirectory (`040000`).
    Tree,
}

/// A single entry in a tree object (one level, not recursive).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name (just the basename, not a full path).
    pub name: String,
    /// Whether the entry is a file or a subdirectory.
    pub kind: NodeKind,
    /// The OID of the blob or tree this entry points to.
    pub oid: Oid,
}

/// An edit operation applied when deriving a new tree from a base tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEdit {
    /// Insert or replace a file entry. Missing intermediate directories are
    /// created automatically.
    Upsert {
        /// Slash-separated path relative to the tree root (no leading `/`).
        path: String,
        /// OID of the blob to store at this path.
        oid: Oid,
    },
    /// Remove a file or an entire subtree. Removing a missing path is a
    /// backend-level no-op; existence checks happen above this layer.
    Remove {
        /// Slash-separated path relative to the tree root.
        path: String,
    },
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// An author or committer identity with a timestamp.
///
/// Timestamps are whole seconds since the Unix epoch, always UTC — dogma
/// truncates to seconds before writing so that commit bytes are reproducible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub seconds: i64,
}

/// A commit object, as written to and read from the store.
///
/// dogma commits always carry the same identity for author and committer;
/// both are kept so that externally-created commits read back faithfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRecord {
    /// OID of the root tree.
    pub tree: Oid,
    /// Parent commit OIDs (empty for the initial commit).
    pub parents: Vec<Oid>,
    /// Author identity.
    pub author: Identity,
    /// Committer identity.
    pub committer: Identity,
    /// The full commit message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Oid --

    #[test]
    fn uppercase_input_normalizes_to_lowercase_display() {
        // Ref tables and commit text store the lowercase form; parsing
        // must still take what external tooling hands us.
        let oid: Oid = "ABCDEF0123456789ABCDEF0123456789ABCDEF01".parse().unwrap();
        assert_eq!(
            oid.to_string(),
            "abcdef0123456789abcdef0123456789abcdef01"
        );
    }

    #[test]
    fn text_form_roundtrips_through_parse() {
        // The cipher backend persists ids as text in refs.json and reads
        // them back; display → parse must be the identity.
        let oid = Oid::from_bytes([0x1f; 20]);
        let reparsed: Oid = oid.to_string().parse().unwrap();
        assert_eq!(reparsed, oid);
        assert_eq!(reparsed.as_bytes(), oid.as_bytes());
    }

    #[test]
    fn zero_is_a_sentinel_distinct_from_real_ids() {
        assert!(Oid::ZERO.is_zero());
        assert!(!Oid::from_bytes([1; 20]).is_zero());
        // Conflict messages still need a stable textual form for it.
        assert_eq!(Oid::ZERO.to_string(), "0".repeat(40));
    }

    #[test]
    fn malformed_object_ids_are_rejected_with_context() {
        let long = "a".repeat(41);
        for bad in ["", "abc", long.as_str()] {
            let err = bad.parse::<Oid>().unwrap_err();
            assert!(err.reason.contains("40"), "{bad:?}: {err}");
        }
        let err = "zz".repeat(20).parse::<Oid>().unwrap_err();
        assert!(err.reason.contains("hex"), "{err}");
    }

    #[test]
    fn ids_order_stably_for_sorted_ref_listings() {
        let mut ids = [
            Oid::from_bytes([9; 20]),
            Oid::ZERO,
            Oid::from_bytes([3; 20]),
        ];
        ids.sort_unstable();
        assert_eq!(ids[0], Oid::ZERO);
        assert!(ids.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    // -- RefName --

    #[test]
    fn refname_valid_refs_prefix() {
        assert!(RefName::new("refs/heads/master").is_ok());
        assert!(RefName::new("refs/revisions/00/1").is_ok());
    }

    #[test]
    fn refname_valid_head() {
        assert!(RefName::new("HEAD").is_ok());
    }

    #[test]
    fn refname_rejects_bare() {
        assert!(RefName::new("master").is_err());
    }

    #[test]
    fn refname_rejects_empty() {
        assert!(RefName::new("").is_err());
    }

    #[test]
    fn refname_rejects_dotdot() {
        assert!(RefName::new("refs/heads/a..b").is_err());
    }

    #[test]
    fn refname_display() {
        let r = RefName::new("refs/heads/master").unwrap();
        assert_eq!(r.to_string(), "refs/heads/master");
    }
}
