//! Command executors.
//!
//! All mutation funnels through a [`CommandExecutor`]: the standalone
//! variant applies commands directly to the local manager, the replicated
//! variant serializes them through a replication log that every replica
//! replays in order. Both share one application routine so a command has
//! the same effect whether it is executed locally or replayed from the
//! log.

mod lock;
mod log;
mod replicated;
mod standalone;

pub use lock::{LockKey, LockTable};
pub use log::{InMemoryLog, LogEntry, ReplicationLog};
pub use replicated::ReplicatedCommandExecutor;
pub use standalone::StandaloneCommandExecutor;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use dogma_core::{CommitMessage, Revision};

use crate::command::{Command, CommandKind, CommandResult, ServerStatus};
use crate::error::{Result, ServerError};
use crate::manager::ProjectManager;
use crate::session::SessionStore;

/// Serializes all mutating operations.
///
/// `execute` blocks until the command's effect is durable on this replica
/// (and, for the replicated variant, committed to the log).
pub trait CommandExecutor: Send + Sync {
    /// Execute one command.
    ///
    /// # Errors
    /// [`ServerError::ReadOnly`] when the server status forbids writes and
    /// the command is not force-pushed, plus whatever the command itself
    /// produces.
    fn execute(&self, command: Command) -> Result<CommandResult>;

    /// The current server status.
    fn status(&self) -> ServerStatus;
}

/// Process-wide replica state: identity and writability.
///
/// Initialized once at startup; afterwards the status only changes through
/// [`CommandKind::UpdateServerStatus`] or a fatal executor error.
pub struct ServerState {
    replica_id: String,
    status: RwLock<ServerStatus>,
}

impl ServerState {
    /// State for one replica, starting [`ServerStatus::Writable`].
    #[must_use]
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            status: RwLock::new(ServerStatus::Writable),
        }
    }

    /// This replica's cluster identity.
    #[must_use]
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        *self.status.read()
    }

    /// Set the status.
    pub fn set_status(&self, status: ServerStatus) {
        let previous = {
            let mut slot = self.status.write();
            std::mem::replace(&mut *slot, status)
        };
        if previous != status {
            info!(?previous, ?status, "server status changed");
        }
    }

    /// Drop into read-only mode after a fatal executor error.
    pub fn halt_read_only(&self, reason: &str) {
        error!(reason, "halting replica into read-only mode");
        self.set_status(ServerStatus::ReadOnly);
    }
}

/// Everything a command application touches.
pub(crate) struct ExecutionContext {
    pub(crate) manager: Arc<ProjectManager>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) state: Arc<ServerState>,
}

impl ExecutionContext {
    /// Refuse mutating commands while not writable, unless force-pushed.
    pub(crate) fn check_writable(&self, command: &Command) -> Result<()> {
        if self.state.status().is_writable() || command.force() {
            Ok(())
        } else {
            Err(ServerError::ReadOnly)
        }
    }

    /// Apply a command to local state. Shared by direct execution and log
    /// replay so both have identical semantics.
    pub(crate) fn apply(&self, command: &Command) -> Result<CommandResult> {
        let timestamp = command.timestamp;
        let author = &command.author;
        match command.effective_kind() {
            CommandKind::CreateProject { project } => {
                self.manager.create_project(project, author, timestamp)?;
                Ok(CommandResult::Done)
            }
            CommandKind::RemoveProject { project } => {
                self.manager.remove_project(project)?;
                Ok(CommandResult::Done)
            }
            CommandKind::UnremoveProject { project } => {
                self.manager.unremove_project(project)?;
                Ok(CommandResult::Done)
            }
            CommandKind::PurgeProject { project } => {
                self.manager.purge_project(project)?;
                Ok(CommandResult::Done)
            }
            CommandKind::CreateRepository {
                project,
                repository,
                encrypted,
            } => {
                self.manager.create_repository(
                    project,
                    repository,
                    author,
                    timestamp,
                    *encrypted,
                )?;
                Ok(CommandResult::Done)
            }
            CommandKind::RemoveRepository {
                project,
                repository,
            } => {
                self.manager.remove_repository(project, repository)?;
                Ok(CommandResult::Done)
            }
            CommandKind::UnremoveRepository {
                project,
                repository,
            } => {
                self.manager.unremove_repository(project, repository)?;
                Ok(CommandResult::Done)
            }
            CommandKind::PurgeRepository {
                project,
                repository,
            } => {
                self.manager.purge_repository(project, repository)?;
                Ok(CommandResult::Done)
            }
            CommandKind::Push {
                project,
                repository,
                base_revision,
                summary,
                detail,
                markup,
                changes,
            } => {
                let repo = self.manager.repository(project, repository)?;
                let message = CommitMessage {
                    summary: summary.clone(),
                    detail: detail.clone(),
                    markup: *markup,
                };
                let revision =
                    repo.commit(*base_revision, timestamp, author, message, changes)?;
                Ok(CommandResult::Pushed { revision })
            }
            CommandKind::CreateSession { session_id } => {
                self.sessions.create(session_id, timestamp);
                Ok(CommandResult::Done)
            }
            CommandKind::RemoveSession { session_id } => {
                self.sessions.remove(session_id);
                Ok(CommandResult::Done)
            }
            CommandKind::UpdateServerStatus { status } => {
                self.state.set_status(*status);
                Ok(CommandResult::Done)
            }
            CommandKind::MigrateToEncryptedRepository {
                project,
                repository,
            } => {
                self.manager.migrate_to_encrypted(project, repository)?;
                Ok(CommandResult::Done)
            }
            CommandKind::ForcePush { .. } => {
                // effective_kind unwraps one level; a nested force-push is
                // malformed.
                Err(ServerError::ReplicationFailed {
                    message: "nested FORCE_PUSH command".to_owned(),
                })
            }
        }
    }
}

/// The revision a push entry expects to land at, for idempotent replay.
pub(crate) fn push_target(kind: &CommandKind) -> Option<(&str, &str, Revision)> {
    match kind {
        CommandKind::Push {
            project,
            repository,
            base_revision,
            ..
        } => Some((project, repository, base_revision.forward(1))),
        _ => None,
    }
}
