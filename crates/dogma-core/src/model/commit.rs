//! Commits and commit messages.
//!
//! The commit message persisted into the object store is JSON carrying the
//! summary, detail, markup, and the revision number, so a history walk can
//! recover the revision without extra state:
//!
//! ```json
//! {"summary": "Edit /a.json", "detail": "", "markup": "PLAINTEXT", "revision": 7}
//! ```
//!
//! Messages that fail to parse as JSON (repositories written by other
//! tools) fall back to first-line-as-summary with `UNKNOWN` markup and no
//! recoverable revision.

use serde::{Deserialize, Serialize};

use crate::model::author::Author;
use crate::model::revision::Revision;

/// How the detail text of a commit message is marked up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Markup {
    /// Plain text.
    #[default]
    Plaintext,
    /// Markdown.
    Markdown,
    /// Unknown — used for messages recovered from foreign commits.
    Unknown,
}

/// The human-facing part of a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMessage {
    /// One-line summary.
    pub summary: String,
    /// Optional longer description.
    #[serde(default)]
    pub detail: String,
    /// Markup of `detail`.
    #[serde(default)]
    pub markup: Markup,
}

impl CommitMessage {
    /// A plaintext message with no detail.
    #[must_use]
    pub fn summary_only(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: String::new(),
            markup: Markup::Plaintext,
        }
    }
}

/// One commit in a repository's linear history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// The revision this commit produced.
    pub revision: Revision,
    /// Who pushed it.
    pub author: Author,
    /// When it was pushed, in whole seconds since the Unix epoch.
    pub timestamp_secs: i64,
    /// Summary, detail, and markup.
    pub message: CommitMessage,
}

// ---------------------------------------------------------------------------
// Stored message payload
// ---------------------------------------------------------------------------

/// The JSON document written as the commit message in the object store.
#[derive(Serialize, Deserialize)]
struct MessagePayload {
    summary: String,
    #[serde(default)]
    detail: String,
    #[serde(default)]
    markup: Markup,
    revision: i64,
}

/// Serialize a commit message plus its revision for storage.
///
/// # Panics
/// Never — the payload contains no non-serializable values.
#[must_use]
pub fn encode_message(message: &CommitMessage, revision: Revision) -> String {
    let payload = MessagePayload {
        summary: message.summary.clone(),
        detail: message.detail.clone(),
        markup: message.markup,
        revision: revision.major(),
    };
    #[allow(clippy::unwrap_used)]
    serde_json::to_string(&payload).unwrap()
}

/// Recover a commit message (and, when present, the revision) from a stored
/// message. Non-JSON messages fall back to the first line as summary.
#[must_use]
pub fn decode_message(stored: &str) -> (CommitMessage, Option<Revision>) {
    if let Ok(payload) = serde_json::from_str::<MessagePayload>(stored) {
        if let Ok(revision) = Revision::new(payload.revision) {
            return (
                CommitMessage {
                    summary: payload.summary,
                    detail: payload.detail,
                    markup: payload.markup,
                },
                Some(revision),
            );
        }
    }
    let summary = stored.lines().next().unwrap_or_default().to_owned();
    (
        CommitMessage {
            summary,
            detail: String::new(),
            markup: Markup::Unknown,
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrip() {
        let message = CommitMessage {
            summary: "Edit /a.json".to_owned(),
            detail: "because".to_owned(),
            markup: Markup::Markdown,
        };
        let encoded = encode_message(&message, Revision::new(7).unwrap());
        let (decoded, revision) = decode_message(&encoded);
        assert_eq!(decoded, message);
        assert_eq!(revision, Some(Revision::new(7).unwrap()));
    }

    #[test]
    fn encoded_message_is_the_wire_contract() {
        let encoded = encode_message(
            &CommitMessage::summary_only("s"),
            Revision::new(2).unwrap(),
        );
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "summary": "s",
                "detail": "",
                "markup": "PLAINTEXT",
                "revision": 2
            })
        );
    }

    #[test]
    fn foreign_message_falls_back_to_first_line() {
        let (message, revision) = decode_message("imported commit\n\nlong body");
        assert_eq!(message.summary, "imported commit");
        assert_eq!(message.markup, Markup::Unknown);
        assert_eq!(revision, None);
    }

    #[test]
    fn json_without_revision_falls_back() {
        let (message, revision) = decode_message("{\"summary\": \"s\"}");
        assert_eq!(revision, None);
        assert_eq!(message.markup, Markup::Unknown);
        assert_eq!(message.summary, "{\"summary\": \"s\"}");
    }
}
