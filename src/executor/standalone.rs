//! The standalone executor — applies commands directly to local state.
//!
//! Used by single-node deployments. Durability comes from the object
//! store's ref-update contract: `execute` returns only after the command's
//! refs (or directory renames) are on disk.

use std::sync::Arc;

use tracing::debug;

use crate::command::{Command, CommandResult, ServerStatus};
use crate::error::Result;
use crate::executor::{CommandExecutor, ExecutionContext, ServerState};
use crate::manager::ProjectManager;
use crate::session::SessionStore;

/// A [`CommandExecutor`] for a single, unreplicated node.
pub struct StandaloneCommandExecutor {
    context: ExecutionContext,
}

impl StandaloneCommandExecutor {
    /// Build a standalone executor over local state.
    #[must_use]
    pub fn new(
        manager: Arc<ProjectManager>,
        sessions: Arc<SessionStore>,
        state: Arc<ServerState>,
    ) -> Self {
        Self {
            context: ExecutionContext {
                manager,
                sessions,
                state,
            },
        }
    }
}

impl CommandExecutor for StandaloneCommandExecutor {
    fn execute(&self, command: Command) -> Result<CommandResult> {
        self.context.check_writable(&command)?;
        debug!(kind = ?command.effective_kind(), "executing command");
        let result = self.context.apply(&command);
        if let Err(error) = &result {
            if matches!(
                error,
                crate::error::ServerError::Store(dogma_git::StoreError::Io(_))
                    | crate::error::ServerError::Store(dogma_git::StoreError::Backend { .. })
            ) {
                self.context
                    .state
                    .halt_read_only(&format!("storage failure: {error}"));
            }
        }
        result
    }

    fn status(&self) -> ServerStatus {
        self.context.state.status()
    }
}
