//! The replication log abstraction.
//!
//! The log defines the total order of all mutating commands across the
//! cluster. `append` blocks until the entry is committed by the consensus
//! layer; `entry` is a blocking indexed read that followers poll in order.
//! The consensus service itself is an external collaborator — this module
//! defines the contract plus an in-process implementation used by tests
//! and single-process clusters.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::command::Command;
use crate::error::{Result, ServerError};

/// One committed entry in the replication log.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    /// Position in the total order, starting at 0.
    pub index: u64,
    /// The replica that appended the entry.
    pub replica_id: String,
    /// The replicated command.
    pub command: Command,
}

/// A totally-ordered, durable command log.
pub trait ReplicationLog: Send + Sync {
    /// Append a command, blocking until it is committed. Returns the
    /// entry's index.
    ///
    /// # Errors
    /// [`ServerError::ReplicationFailed`] when the log cannot commit.
    fn append(&self, replica_id: &str, command: Command) -> Result<u64>;

    /// Read the entry at `index`, waiting up to `wait` for it to appear.
    /// Returns `None` when the entry has not been committed in time.
    ///
    /// # Errors
    /// [`ServerError::ReplicationFailed`] when the log is unreadable.
    fn entry(&self, index: u64, wait: Duration) -> Result<Option<LogEntry>>;

    /// The index one past the last committed entry.
    fn next_index(&self) -> u64;
}

/// An in-process [`ReplicationLog`]: a mutex-guarded vector with a condvar
/// for blocking reads. Commit is immediate — there is no quorum to wait
/// for inside one process.
#[derive(Default)]
pub struct InMemoryLog {
    entries: Mutex<Vec<LogEntry>>,
    appended: Condvar,
}

impl InMemoryLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplicationLog for InMemoryLog {
    fn append(&self, replica_id: &str, command: Command) -> Result<u64> {
        let mut entries = self.entries.lock();
        let index = entries.len() as u64;
        entries.push(LogEntry {
            index,
            replica_id: replica_id.to_owned(),
            command,
        });
        self.appended.notify_all();
        Ok(index)
    }

    fn entry(&self, index: u64, wait: Duration) -> Result<Option<LogEntry>> {
        let deadline = std::time::Instant::now() + wait;
        let mut entries = self.entries.lock();
        loop {
            if let Some(entry) = entries.get(usize::try_from(index).map_err(|_| {
                ServerError::ReplicationFailed {
                    message: format!("log index {index} out of addressable range"),
                }
            })?) {
                return Ok(Some(entry.clone()));
            }
            if self.appended.wait_until(&mut entries, deadline).timed_out() {
                return Ok(None);
            }
        }
    }

    fn next_index(&self) -> u64 {
        self.entries.lock().len() as u64
    }
}
