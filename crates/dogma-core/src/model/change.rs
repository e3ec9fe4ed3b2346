//! Changes — the planned mutations a push carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::path::FilePath;

/// The payload of a [`Change`], discriminated by `type` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "type", content = "content")]
pub enum ChangeContent {
    /// Add a new JSON file or replace an existing one.
    UpsertJson(Value),

    /// Add a new text file or replace an existing one.
    UpsertText(String),

    /// Remove an existing file, or a directory with everything under it.
    Remove,

    /// Rename an existing file or directory to the given path.
    Rename(FilePath),

    /// Apply an [RFC 6902](https://tools.ietf.org/html/rfc6902) JSON patch
    /// to a JSON file.
    ApplyJsonPatch(Value),

    /// Apply a unified-format textual patch to a text file.
    ApplyTextPatch(String),
}

/// A planned mutation of a single entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    /// Path of the entry the change applies to.
    pub path: FilePath,
    /// What to do at that path.
    #[serde(flatten)]
    pub content: ChangeContent,
}

impl Change {
    /// An `UPSERT_JSON` change. The path must name a JSON file.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `path` is invalid or not `.json`.
    pub fn upsert_json(path: &str, value: Value) -> Result<Self, Error> {
        let path = FilePath::new(path)?;
        if !path.is_json() {
            return Err(Error::invalid(format!(
                "UPSERT_JSON requires a .json path: {path}"
            )));
        }
        Ok(Self {
            path,
            content: ChangeContent::UpsertJson(value),
        })
    }

    /// An `UPSERT_TEXT` change.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `path` is invalid.
    pub fn upsert_text(path: &str, text: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            content: ChangeContent::UpsertText(text.into()),
        })
    }

    /// A `REMOVE` change.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `path` is invalid.
    pub fn remove(path: &str) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            content: ChangeContent::Remove,
        })
    }

    /// A `RENAME` change from `path` to `target`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either path is invalid.
    pub fn rename(path: &str, target: &str) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            content: ChangeContent::Rename(FilePath::new(target)?),
        })
    }

    /// An `APPLY_JSON_PATCH` change. The path must name a JSON file.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `path` is invalid or not `.json`.
    pub fn apply_json_patch(path: &str, patch: Value) -> Result<Self, Error> {
        let path = FilePath::new(path)?;
        if !path.is_json() {
            return Err(Error::invalid(format!(
                "APPLY_JSON_PATCH requires a .json path: {path}"
            )));
        }
        Ok(Self {
            path,
            content: ChangeContent::ApplyJsonPatch(patch),
        })
    }

    /// An `APPLY_TEXT_PATCH` change.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `path` is invalid.
    pub fn apply_text_patch(path: &str, patch: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            content: ChangeContent::ApplyTextPatch(patch.into()),
        })
    }
}
