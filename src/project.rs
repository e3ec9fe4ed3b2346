//! Projects — the top-level namespace.
//!
//! A project is a directory under the data root holding a `project.json`
//! metadata file and one subdirectory per repository. Every project is
//! created with two well-known repositories, `dogma` and `meta`, which
//! hold project configuration as ordinary entries.

use serde::{Deserialize, Serialize};

use dogma_core::Author;

use crate::error::{Result, ServerError};

/// The repository every project carries for server-side configuration.
pub const DOGMA_REPO: &str = "dogma";
/// The repository every project carries for project metadata.
pub const META_REPO: &str = "meta";

/// Suffix marking a soft-removed project or repository directory.
pub const REMOVED_SUFFIX: &str = ".removed";

/// Project metadata (`project.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project name.
    pub name: String,
    /// Who created the project.
    pub creator: Author,
    /// Creation time, milliseconds since the epoch.
    pub created_at: i64,
}

/// Validate a project or repository name.
///
/// Names share the path-segment grammar (`[A-Za-z0-9._-]+`) and must not
/// collide with the directory suffixes the manager uses for its layout.
///
/// # Errors
/// [`ServerError::InvalidName`] with the reason.
pub fn validate_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(ServerError::InvalidName {
            name: name.to_owned(),
            reason: reason.to_owned(),
        })
    };
    if name.is_empty() {
        return reject("name must not be empty");
    }
    if name == "." || name == ".." {
        return reject("name must not be '.' or '..'");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
    {
        return reject("name must match [A-Za-z0-9._-]+");
    }
    if name.ends_with(REMOVED_SUFFIX) || name.ends_with(".git") || name.ends_with(".cipher") {
        return reject("name must not end with a reserved suffix");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_names_pass() {
        for name in ["proj", "my-project", "a.b_c-9"] {
            assert!(validate_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn reserved_and_malformed_names_fail() {
        for name in ["", ".", "..", "a/b", "a b", "x.removed", "y.git", "z.cipher"] {
            assert!(validate_name(name).is_err(), "{name} should be invalid");
        }
    }
}
