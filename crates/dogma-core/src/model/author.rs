//! Commit and lifecycle authorship.

use serde::{Deserialize, Serialize};

/// Creator of a project, repository, or commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Author {
    /// The implicit author for internally-generated commits and for
    /// commands that arrive without author metadata.
    #[must_use]
    pub fn system() -> Self {
        Self {
            name: "System".to_owned(),
            email: "system@localhost".to_owned(),
        }
    }

    /// Build an author from name and email.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}
