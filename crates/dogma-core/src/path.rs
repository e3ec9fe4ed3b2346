//! File paths and path patterns.
//!
//! A file path is an absolute Unix-style string: `/ (segment /)* segment`
//! where a segment is `[A-Za-z0-9._-]+` excluding exactly `.` and `..`.
//! `/` alone names the repository root directory.
//!
//! A path pattern is one or more comma-separated globs over `/`-separated
//! paths: `*` matches within one segment, `**` spans any number of segments
//! (including zero), `?` matches a single character. Patterns must begin
//! with `/` and matching is case-sensitive.

use std::fmt;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// FilePath
// ---------------------------------------------------------------------------

/// A validated absolute entry path.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilePath(String);

impl FilePath {
    /// The repository root directory, `/`.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Validate and wrap a path string.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when the string violates the path grammar.
    pub fn new(path: &str) -> Result<Self, Error> {
        Self::validate(path)?;
        Ok(Self(path.to_owned()))
    }

    fn validate(path: &str) -> Result<(), Error> {
        if !path.starts_with('/') {
            return Err(Error::invalid(format!(
                "path must be absolute (start with '/'): {path:?}"
            )));
        }
        if path == "/" {
            return Ok(());
        }
        if path.ends_with('/') {
            return Err(Error::invalid(format!(
                "path must not end with '/': {path:?}"
            )));
        }
        for segment in path[1..].split('/') {
            if segment.is_empty() {
                return Err(Error::invalid(format!(
                    "path must not contain consecutive '/': {path:?}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(Error::invalid(format!(
                    "path must not contain '.' or '..' segments: {path:?}"
                )));
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
            {
                return Err(Error::invalid(format!(
                    "path segment {segment:?} contains a character outside [A-Za-z0-9._-]"
                )));
            }
        }
        Ok(())
    }

    /// The path as a string slice, always starting with `/`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if this is the root directory `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path relative to the tree root, without the leading `/`
    /// (empty for the root itself).
    #[must_use]
    pub fn tree_path(&self) -> &str {
        &self.0[1..]
    }

    /// The final path segment, or `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// `true` if the path names a JSON entry (by `.json` suffix).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.0.ends_with(".json")
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilePath({:?})", self.0)
    }
}

impl TryFrom<String> for FilePath {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Error> {
        Self::new(&value)
    }
}

impl From<FilePath> for String {
    fn from(path: FilePath) -> Self {
        path.0
    }
}

impl std::str::FromStr for FilePath {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Error> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// PathPattern
// ---------------------------------------------------------------------------

/// A compiled path pattern: one or more comma-separated globs.
#[derive(Clone, Debug)]
pub struct PathPattern {
    raw: String,
    set: GlobSet,
}

impl PathPattern {
    /// The pattern matching every entry, `/**`.
    ///
    /// # Panics
    /// Never — the pattern is known-good.
    #[must_use]
    pub fn all() -> Self {
        #[allow(clippy::unwrap_used)]
        Self::new("/**").unwrap()
    }

    /// Compile a pattern string.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when a sub-pattern is empty, does not
    /// begin with `/`, or is not a valid glob.
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let mut builder = GlobSetBuilder::new();
        let mut any = false;
        for part in pattern.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::invalid(format!(
                    "pattern must not contain an empty sub-pattern: {pattern:?}"
                )));
            }
            if !part.starts_with('/') {
                return Err(Error::invalid(format!(
                    "pattern must begin with '/': {part:?}"
                )));
            }
            add_glob(&mut builder, part)?;
            // `**` spans *zero* or more segments: `/a/**` also matches `/a`.
            if let Some(stem) = part.strip_suffix("/**") {
                if !stem.is_empty() {
                    add_glob(&mut builder, stem)?;
                }
            }
            any = true;
        }
        if !any {
            return Err(Error::invalid("pattern must not be empty"));
        }
        let set = builder
            .build()
            .map_err(|e| Error::invalid(format!("malformed pattern {pattern:?}: {e}")))?;
        Ok(Self {
            raw: pattern.to_owned(),
            set,
        })
    }

    /// The original pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` if `path` matches any sub-pattern.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.set.is_match(path)
    }
}

fn add_glob(builder: &mut GlobSetBuilder, pattern: &str) -> Result<(), Error> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::invalid(format!("malformed pattern {pattern:?}: {e}")))?;
    builder.add(glob);
    Ok(())
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    // -- FilePath --

    #[test]
    fn root_is_valid() {
        assert!(FilePath::new("/").unwrap().is_root());
    }

    #[test]
    fn ordinary_paths_are_valid() {
        for p in ["/a.json", "/a/b/c.txt", "/under_score-dash.99"] {
            assert!(FilePath::new(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(FilePath::new("a.json").is_err());
        assert!(FilePath::new("").is_err());
    }

    #[test]
    fn dot_segments_are_rejected() {
        assert!(FilePath::new("/./a.json").is_err());
        assert!(FilePath::new("/a/../b.json").is_err());
    }

    #[test]
    fn consecutive_and_trailing_slashes_are_rejected() {
        assert!(FilePath::new("/a//b").is_err());
        assert!(FilePath::new("/a/").is_err());
    }

    #[test]
    fn backslash_and_control_chars_are_rejected() {
        assert!(FilePath::new("/a\\b").is_err());
        assert!(FilePath::new("/a\tb").is_err());
    }

    #[test]
    fn file_name_and_tree_path() {
        let p = FilePath::new("/a/b.json").unwrap();
        assert_eq!(p.file_name(), Some("b.json"));
        assert_eq!(p.tree_path(), "a/b.json");
        assert!(p.is_json());
        assert_eq!(FilePath::root().file_name(), None);
    }

    // -- PathPattern --

    #[test]
    fn star_stays_within_a_segment() {
        let p = PathPattern::new("/*").unwrap();
        assert!(p.matches("/a.json"));
        assert!(!p.matches("/sub/a.json"));
    }

    #[test]
    fn double_star_spans_segments() {
        let p = PathPattern::new("/**").unwrap();
        assert!(p.matches("/a.json"));
        assert!(p.matches("/sub/deeper/a.json"));
    }

    #[test]
    fn double_star_matches_zero_segments() {
        let p = PathPattern::new("/conf/**").unwrap();
        assert!(p.matches("/conf"));
        assert!(p.matches("/conf/a.json"));
        assert!(!p.matches("/other/a.json"));
    }

    #[test]
    fn question_mark_matches_one_character() {
        let p = PathPattern::new("/a?.json").unwrap();
        assert!(p.matches("/ab.json"));
        assert!(!p.matches("/a.json"));
        assert!(!p.matches("/abc.json"));
    }

    #[test]
    fn comma_joins_alternatives() {
        let p = PathPattern::new("/a.json, /b/**").unwrap();
        assert!(p.matches("/a.json"));
        assert!(p.matches("/b/c.txt"));
        assert!(!p.matches("/c.json"));
    }

    #[test]
    fn pattern_must_start_with_slash() {
        assert!(PathPattern::new("*.json").is_err());
        assert!(PathPattern::new("/a.json,b.json").is_err());
    }

    #[test]
    fn matching_is_case_sensitive() {
        let p = PathPattern::new("/A.json").unwrap();
        assert!(!p.matches("/a.json"));
    }

    proptest! {
        #[test]
        fn all_pattern_matches_every_valid_path(segments in proptest::collection::vec("[a-z0-9]{1,8}", 1..5)) {
            let path = format!("/{}", segments.join("/"));
            let path = FilePath::new(&path).unwrap();
            prop_assert!(PathPattern::all().matches(path.as_str()));
        }
    }
}
