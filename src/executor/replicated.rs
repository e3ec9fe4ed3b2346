//! The replicated executor — serializes mutation through the replication
//! log.
//!
//! Write path on the leader: acquire the logical lock, normalize the
//! command, append it to the log (blocking until committed), apply it
//! locally, reply. Every replica — leader included for entries from other
//! replicas — runs a replay loop consuming the log in order; an entry
//! whose effect is already present is skipped, and an entry whose
//! expected base disagrees with local state halts the replica into
//! read-only mode with a divergence alert.
//!
//! Leader election lives in the external consensus service; it drives the
//! [`on_take_leadership`](ReplicatedCommandExecutor::on_take_leadership) /
//! [`on_release_leadership`](ReplicatedCommandExecutor::on_release_leadership)
//! callbacks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use dogma_core::Error as CoreError;

use crate::command::{Command, CommandKind, CommandResult, ServerStatus};
use crate::error::{Result, ServerError};
use crate::executor::lock::{LockKey, LockTable};
use crate::executor::log::{LogEntry, ReplicationLog};
use crate::executor::{CommandExecutor, ExecutionContext, ServerState, push_target};
use crate::manager::ProjectManager;
use crate::session::SessionStore;

/// How long the replay loop waits on the log before re-checking shutdown.
const REPLAY_POLL: Duration = Duration::from_millis(200);

/// A [`CommandExecutor`] participating in a replicated cluster.
pub struct ReplicatedCommandExecutor {
    context: ExecutionContext,
    log: Arc<dyn ReplicationLog>,
    locks: Arc<LockTable>,
    command_timeout: Duration,
    leader: AtomicBool,
    /// Index of the next log entry to replay locally.
    next_replay: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    replay_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ReplicatedCommandExecutor {
    /// Build a replicated executor. Call [`start`](Self::start) to begin
    /// consuming the log.
    #[must_use]
    pub fn new(
        manager: Arc<ProjectManager>,
        sessions: Arc<SessionStore>,
        state: Arc<ServerState>,
        log: Arc<dyn ReplicationLog>,
        locks: Arc<LockTable>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            context: ExecutionContext {
                manager,
                sessions,
                state,
            },
            log,
            locks,
            command_timeout,
            leader: AtomicBool::new(false),
            next_replay: Arc::new(AtomicU64::new(0)),
            stop: Arc::new(AtomicBool::new(false)),
            replay_thread: Mutex::new(None),
        }
    }

    /// Spawn the follower replay loop.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.replay_thread.lock();
        if slot.is_some() {
            return;
        }
        let executor = Arc::clone(self);
        *slot = Some(std::thread::spawn(move || executor.replay_loop()));
    }

    /// Stop the replay loop and wait for it to exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.replay_thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// `true` while this replica is the elected leader.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::Acquire)
    }

    /// Consensus callback: this replica became leader. Catches up on the
    /// log before accepting writes so the leader never writes from stale
    /// state.
    pub fn on_take_leadership(&self) {
        self.catch_up();
        self.leader.store(true, Ordering::Release);
        info!(replica = self.context.state.replica_id(), "took leadership");
    }

    /// Consensus callback: leadership lost.
    pub fn on_release_leadership(&self) {
        self.leader.store(false, Ordering::Release);
        info!(
            replica = self.context.state.replica_id(),
            "released leadership"
        );
    }

    fn catch_up(&self) {
        let target = self.log.next_index();
        while self.next_replay.load(Ordering::Acquire) < target {
            match self
                .log
                .entry(self.next_replay.load(Ordering::Acquire), REPLAY_POLL)
            {
                Ok(Some(entry)) => self.replay_entry(&entry),
                Ok(None) => break,
                Err(error) => {
                    self.context
                        .state
                        .halt_read_only(&format!("log read failed during catch-up: {error}"));
                    break;
                }
            }
        }
    }

    fn replay_loop(&self) {
        while !self.stop.load(Ordering::Acquire) {
            if !self.context.state.status().is_replicating() {
                std::thread::sleep(REPLAY_POLL);
                continue;
            }
            let index = self.next_replay.load(Ordering::Acquire);
            match self.log.entry(index, REPLAY_POLL) {
                Ok(Some(entry)) => self.replay_entry(&entry),
                Ok(None) => {}
                Err(error) => {
                    self.context
                        .state
                        .halt_read_only(&format!("log read failed: {error}"));
                    return;
                }
            }
        }
    }

    fn replay_entry(&self, entry: &LogEntry) {
        // Entries this replica appended were applied inline at execute
        // time; only advance the cursor.
        if entry.replica_id == self.context.state.replica_id() {
            self.next_replay.store(entry.index + 1, Ordering::Release);
            return;
        }
        debug!(index = entry.index, origin = %entry.replica_id, "replaying log entry");
        match self.apply_replayed(&entry.command) {
            Ok(()) => {
                self.next_replay.store(entry.index + 1, Ordering::Release);
            }
            Err(error) => {
                self.context.state.halt_read_only(&format!(
                    "divergence at log index {}: {error}",
                    entry.index
                ));
            }
        }
    }

    /// Apply a replayed entry, tolerating effects that already happened.
    fn apply_replayed(&self, command: &Command) -> std::result::Result<(), ServerError> {
        // Idempotent-replay check for pushes: if the target revision is
        // already the local head, the entry was applied before (e.g. this
        // replica crashed after applying but before advancing its cursor).
        if let Some((project, repository, target)) = push_target(command.effective_kind()) {
            let repo = self.context.manager.repository(project, repository)?;
            let head = repo.head_revision();
            if head >= target {
                debug!(project, repository, revision = target.major(), "skipping applied push");
                return Ok(());
            }
            if target.major() > head.major() + 1 {
                return Err(ServerError::Divergence {
                    message: format!(
                        "log expects {project}/{repository} at revision {} but head is {head}",
                        target.major() - 1,
                    ),
                });
            }
        }

        match self.context.apply(command) {
            Ok(_) => Ok(()),
            // Lifecycle collisions on replay mean the effect is already
            // present — the entry is skipped, not fatal.
            Err(
                ServerError::ProjectExists { .. }
                | ServerError::RepositoryExists { .. }
                | ServerError::ProjectNotFound { .. }
                | ServerError::RepositoryNotFound { .. },
            ) => {
                warn!("replayed lifecycle entry was already applied; skipping");
                Ok(())
            }
            Err(ServerError::Core(CoreError::RedundantChange)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// The logical lock a command takes.
    fn lock_key(kind: &CommandKind) -> LockKey {
        match kind {
            CommandKind::Push {
                project,
                repository,
                ..
            } => LockKey::Repository {
                project: project.clone(),
                repository: repository.clone(),
            },
            _ => LockKey::Global,
        }
    }

    /// Normalize a push's base revision to its absolute form so replicas
    /// replay against an unambiguous base.
    fn normalize_command(&self, mut command: Command) -> Result<Command> {
        let kind = match &mut command.kind {
            CommandKind::ForcePush { command } => command.as_mut(),
            other => other,
        };
        if let CommandKind::Push {
            project,
            repository,
            base_revision,
            ..
        } = kind
        {
            let repo = self.context.manager.repository(project, repository)?;
            *base_revision = repo.normalize(*base_revision)?;
        }
        Ok(command)
    }
}

impl CommandExecutor for ReplicatedCommandExecutor {
    fn execute(&self, command: Command) -> Result<CommandResult> {
        self.context.check_writable(&command)?;
        if !self.is_leader() {
            // Followers do not execute writes; the routing layer forwards
            // to the leader. Locally this surfaces as read-only.
            return Err(ServerError::ReadOnly);
        }

        let command = self.normalize_command(command)?;
        let key = Self::lock_key(command.effective_kind());
        let _lock = self.locks.acquire(&key, self.command_timeout)?;

        let index = self
            .log
            .append(self.context.state.replica_id(), command.clone())?;
        debug!(index, key = %key, "appended command to the replication log");

        let result = self.context.apply(&command);
        match &result {
            Ok(_) => {
                // Inline application covers this entry; the replay loop
                // will skip it by origin.
                self.next_replay
                    .fetch_max(index + 1, Ordering::AcqRel);
            }
            Err(error) => {
                // The entry is committed; every replica (including this
                // one, via replay tolerance) converges on its effect. A
                // local apply failure that is not a domain error means
                // this replica can no longer follow the log.
                if matches!(error, ServerError::Store(_) | ServerError::Io(_)) {
                    self.context
                        .state
                        .halt_read_only(&format!("apply failed after log commit: {error}"));
                }
            }
        }
        result
    }

    fn status(&self) -> ServerStatus {
        self.context.state.status()
    }
}
