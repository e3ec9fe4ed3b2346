//! Entries — the files and directories stored at a revision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::path::FilePath;

/// The type of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// A UTF-8 encoded JSON file.
    Json,
    /// A UTF-8 encoded text file.
    Text,
    /// A directory.
    Directory,
}

impl EntryType {
    /// The entry type implied by a path: `.json` files are JSON, everything
    /// else is text.
    #[must_use]
    pub fn for_file(path: &FilePath) -> Self {
        if path.is_json() { Self::Json } else { Self::Text }
    }
}

/// The content of a file entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(tag = "type", content = "content")]
pub enum EntryContent {
    /// Parsed JSON content.
    Json(Value),
    /// UTF-8 text content.
    Text(String),
}

/// A file or a directory at some revision.
///
/// Directory entries never carry content. File entries loaded through
/// `find` with `fetch_content: false` carry `content: None`; `get` always
/// loads content for files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Path of this entry.
    pub path: FilePath,
    /// The entry type.
    #[serde(rename = "type")]
    pub kind: EntryType,
    /// Content, when loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<EntryContent>,
}

impl Entry {
    /// A JSON file entry with content.
    #[must_use]
    pub fn json(path: FilePath, value: Value) -> Self {
        Self {
            path,
            kind: EntryType::Json,
            content: Some(EntryContent::Json(value)),
        }
    }

    /// A text file entry with content.
    #[must_use]
    pub fn text(path: FilePath, text: impl Into<String>) -> Self {
        Self {
            path,
            kind: EntryType::Text,
            content: Some(EntryContent::Text(text.into())),
        }
    }

    /// A directory entry.
    #[must_use]
    pub fn directory(path: FilePath) -> Self {
        Self {
            path,
            kind: EntryType::Directory,
            content: None,
        }
    }

    /// A file entry whose content was not fetched.
    #[must_use]
    pub fn without_content(path: FilePath, kind: EntryType) -> Self {
        Self {
            path,
            kind,
            content: None,
        }
    }

    /// The JSON content of this entry.
    ///
    /// # Errors
    /// [`Error::QueryFailed`] if the entry is not JSON or content was not
    /// fetched.
    pub fn content_as_json(&self) -> Result<&Value, Error> {
        match &self.content {
            Some(EntryContent::Json(value)) => Ok(value),
            _ => Err(Error::QueryFailed {
                path: self.path.to_string(),
                message: "entry has no JSON content".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entry_type_follows_suffix() {
        assert_eq!(
            EntryType::for_file(&FilePath::new("/a.json").unwrap()),
            EntryType::Json
        );
        assert_eq!(
            EntryType::for_file(&FilePath::new("/a.txt").unwrap()),
            EntryType::Text
        );
    }

    #[test]
    fn content_serializes_with_type_tag() {
        let content = EntryContent::Json(json!([1]));
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value, json!({"type": "JSON", "content": [1]}));
    }

    #[test]
    fn directory_entry_has_no_content() {
        let entry = Entry::directory(FilePath::new("/conf").unwrap());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "DIRECTORY");
        assert!(value.get("content").is_none());
    }

    #[test]
    fn content_as_json_rejects_text() {
        let entry = Entry::text(FilePath::new("/a.txt").unwrap(), "hi\n");
        assert!(entry.content_as_json().is_err());
    }
}
