//! Commands — the unit of mutation and of replication.
//!
//! Every mutating operation is a [`Command`]: a `type`-discriminated
//! payload plus timestamp/author metadata. The same JSON document a client
//! submits is what the replication log carries, so the serde contract here
//! is the cluster's wire format. Backward compatibility: unknown optional
//! fields are ignored, and missing timestamp/author default to now/SYSTEM.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use dogma_core::{Author, Change, Markup, Revision};

/// A mutating request routed through a command executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// When the command was issued, in milliseconds since the epoch.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
    /// Who issued it.
    #[serde(default = "Author::system")]
    pub author: Author,
    /// The operation itself.
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl Command {
    /// Wrap a command kind with "now" and the system author.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self {
            timestamp: now_millis(),
            author: Author::system(),
            kind,
        }
    }

    /// Wrap a command kind with an explicit author.
    #[must_use]
    pub fn by(author: Author, kind: CommandKind) -> Self {
        Self {
            timestamp: now_millis(),
            author,
            kind,
        }
    }

    /// `true` if this is a force-push envelope, which bypasses read-only
    /// mode.
    #[must_use]
    pub fn force(&self) -> bool {
        matches!(self.kind, CommandKind::ForcePush { .. })
    }

    /// The innermost kind, unwrapping a force-push envelope.
    #[must_use]
    pub fn effective_kind(&self) -> &CommandKind {
        match &self.kind {
            CommandKind::ForcePush { command } => command,
            other => other,
        }
    }
}

/// The tagged payload of a [`Command`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum CommandKind {
    /// Create a project (with its `dogma` and `meta` repositories).
    CreateProject {
        /// Project name.
        project: String,
    },

    /// Soft-delete a project.
    RemoveProject {
        /// Project name.
        project: String,
    },

    /// Restore a soft-deleted project.
    UnremoveProject {
        /// Project name.
        project: String,
    },

    /// Permanently delete a soft-deleted project.
    PurgeProject {
        /// Project name.
        project: String,
    },

    /// Create a repository.
    CreateRepository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
        /// Create the repository on the encrypted backend.
        #[serde(default)]
        encrypted: bool,
    },

    /// Soft-delete a repository.
    RemoveRepository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
    },

    /// Restore a soft-deleted repository.
    UnremoveRepository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
    },

    /// Permanently delete a soft-deleted repository.
    PurgeRepository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
    },

    /// Commit a change set on top of `base_revision`.
    Push {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
        /// The revision the change set was prepared against.
        base_revision: Revision,
        /// Commit summary.
        summary: String,
        /// Commit detail.
        #[serde(default)]
        detail: String,
        /// Markup of `detail`.
        #[serde(default)]
        markup: Markup,
        /// The changes to apply.
        changes: Vec<Change>,
    },

    /// Record a client session.
    CreateSession {
        /// Session id.
        session_id: String,
    },

    /// Drop a client session.
    RemoveSession {
        /// Session id.
        session_id: String,
    },

    /// Change the cluster's server status.
    UpdateServerStatus {
        /// The new status.
        status: ServerStatus,
    },

    /// Convert a plaintext repository to the encrypted backend in place.
    MigrateToEncryptedRepository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
    },

    /// Execute the wrapped command even while the server is read-only.
    ForcePush {
        /// The wrapped command kind.
        command: Box<CommandKind>,
    },
}

/// What a successfully executed command produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandResult {
    /// The command completed with nothing to return.
    Done,
    /// A push landed at this revision.
    Pushed {
        /// The new head revision.
        revision: Revision,
    },
}

/// The cluster-wide writability status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Accepting writes.
    #[default]
    Writable,
    /// Read-only for clients, but still consuming the replication log.
    ReplicationOnly,
    /// Fully read-only.
    ReadOnly,
}

impl ServerStatus {
    /// `true` if client writes are accepted.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Writable)
    }

    /// `true` if the replica still applies replicated entries.
    #[must_use]
    pub const fn is_replicating(self) -> bool {
        matches!(self, Self::Writable | Self::ReplicationOnly)
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn push_command_wire_format() {
        let command = Command::by(
            Author::new("alice", "alice@example.com"),
            CommandKind::Push {
                project: "p".to_owned(),
                repository: "r".to_owned(),
                base_revision: Revision::INIT,
                summary: "s".to_owned(),
                detail: String::new(),
                markup: Markup::Plaintext,
                changes: vec![Change::upsert_text("/a.txt", "x\n").unwrap()],
            },
        );
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "PUSH");
        assert_eq!(value["baseRevision"], 1);
        assert_eq!(value["author"]["name"], "alice");
        assert_eq!(value["changes"][0]["type"], "UPSERT_TEXT");
    }

    #[test]
    fn missing_metadata_defaults_to_now_and_system() {
        let parsed: Command = serde_json::from_value(json!({
            "type": "CREATE_PROJECT",
            "project": "p"
        }))
        .unwrap();
        assert_eq!(parsed.author, Author::system());
        assert!(parsed.timestamp > 0);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let parsed: Result<Command, _> = serde_json::from_value(json!({
            "type": "REMOVE_PROJECT",
            "project": "p",
            "futureField": {"anything": true}
        }));
        assert!(parsed.is_ok());
    }

    #[test]
    fn force_push_unwraps_to_the_inner_kind() {
        let command = Command::new(CommandKind::ForcePush {
            command: Box::new(CommandKind::UpdateServerStatus {
                status: ServerStatus::Writable,
            }),
        });
        assert!(command.force());
        assert!(matches!(
            command.effective_kind(),
            CommandKind::UpdateServerStatus { .. }
        ));
    }

    #[test]
    fn command_roundtrips_through_json() {
        let command = Command::new(CommandKind::CreateRepository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
            encrypted: true,
        });
        let text = serde_json::to_string(&command).unwrap();
        let parsed: Command = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, command);
    }
}
