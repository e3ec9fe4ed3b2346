//! The long-poll watch notifier.
//!
//! Every waiter is a one-shot bounded channel: completion is a `try_send`
//! that can never block, so a slow consumer cannot stall the writer's
//! notification fan-out. Waiters are removed atomically on completion,
//! cancellation, or timeout — a waiter observes at most one signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{Entry, Revision};
use crate::path::{FilePath, PathPattern};
use crate::repository::Repository;

/// What a completed watch observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchSignal {
    /// A commit matching the watched pattern landed at this revision.
    Changed(Revision),
    /// The repository is shutting down or was removed.
    Shutdown,
}

struct Waiter {
    id: u64,
    pattern: PathPattern,
    sender: SyncSender<WatchSignal>,
}

struct Inner {
    waiters: Mutex<Vec<Waiter>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Per-repository registry of long-poll waiters.
pub(crate) struct WatchNotifier {
    inner: Arc<Inner>,
}

impl WatchNotifier {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                waiters: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a waiter for `pattern`.
    pub(crate) fn register(&self, pattern: PathPattern) -> WatchListener {
        let (sender, receiver) = sync_channel(1);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if self.inner.closed.load(Ordering::Acquire) {
            // Late registration during shutdown completes immediately.
            let _ = sender.try_send(WatchSignal::Shutdown);
        } else {
            self.inner.waiters.lock().push(Waiter {
                id,
                pattern,
                sender,
            });
        }
        WatchListener {
            id,
            inner: Arc::clone(&self.inner),
            receiver,
        }
    }

    /// Complete one waiter by id, out of band (used for the subscribe-time
    /// race where a matching commit already landed).
    pub(crate) fn complete(&self, id: u64, revision: Revision) {
        let mut waiters = self.inner.waiters.lock();
        if let Some(index) = waiters.iter().position(|w| w.id == id) {
            let waiter = waiters.swap_remove(index);
            let _ = waiter.sender.try_send(WatchSignal::Changed(revision));
        }
    }

    /// Wake every waiter whose pattern matches a touched path. Runs after
    /// the commit's write lock is released.
    pub(crate) fn notify(&self, revision: Revision, touched: &[String]) {
        if touched.is_empty() {
            return;
        }
        let mut waiters = self.inner.waiters.lock();
        let mut index = 0;
        while index < waiters.len() {
            let matches = touched
                .iter()
                .any(|path| waiters[index].pattern.matches(path));
            if matches {
                let waiter = waiters.swap_remove(index);
                trace!(waiter = waiter.id, revision = revision.major(), "watch completed");
                let _ = waiter.sender.try_send(WatchSignal::Changed(revision));
            } else {
                index += 1;
            }
        }
    }

    /// Complete every waiter with [`WatchSignal::Shutdown`] and refuse new
    /// registrations.
    pub(crate) fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut waiters = self.inner.waiters.lock();
        for waiter in waiters.drain(..) {
            let _ = waiter.sender.try_send(WatchSignal::Shutdown);
        }
    }
}

/// A registered watch. Dropping it (or calling [`cancel`](Self::cancel))
/// removes the waiter from the notifier.
pub struct WatchListener {
    id: u64,
    inner: Arc<Inner>,
    receiver: Receiver<WatchSignal>,
}

impl WatchListener {
    /// Block until the watch completes or `timeout` elapses.
    ///
    /// # Errors
    /// [`Error::ShuttingDown`] when the repository closes while waiting.
    pub fn wait(self, timeout: Duration) -> Result<Option<Revision>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(WatchSignal::Changed(revision)) => Ok(Some(revision)),
            Ok(WatchSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                Err(Error::ShuttingDown)
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
        }
    }

    /// Check for a signal without blocking.
    #[must_use]
    pub fn poll(&self) -> Option<WatchSignal> {
        self.receiver.try_recv().ok()
    }

    /// Remove the waiter without waiting.
    pub fn cancel(self) {
        // Drop does the deregistration.
    }
}

impl Drop for WatchListener {
    fn drop(&mut self) {
        let mut waiters = self.inner.waiters.lock();
        if let Some(index) = waiters.iter().position(|w| w.id == self.id) {
            waiters.swap_remove(index);
        }
    }
}

// ---------------------------------------------------------------------------
// Repository watch API
// ---------------------------------------------------------------------------

impl Repository {
    /// Register a watch for commits after `last_known` touching `pattern`.
    ///
    /// If a matching commit already landed between `last_known` and the
    /// current head, the listener is completed immediately with the head
    /// revision — this closes the race between a client's last read and
    /// its watch call.
    ///
    /// # Errors
    /// [`Error::RevisionNotFound`] when `last_known` does not normalize
    /// (in particular, when it is ahead of the head);
    /// [`Error::ShuttingDown`] when the repository is closed.
    pub fn watch_listener(
        &self,
        last_known: Revision,
        pattern: &PathPattern,
    ) -> Result<WatchListener> {
        self.ensure_open()?;
        let normalized = self.normalize(last_known)?;

        // Register first: a commit landing after the check below will find
        // the waiter already in the registry.
        let listener = self.notifier().register(pattern.clone());

        let head = self.head_state().revision;
        if normalized < head && self.has_matching_change(normalized, head, pattern)? {
            self.notifier().complete(listener.id, head);
        }
        Ok(listener)
    }

    /// Long-poll: block until a commit after `last_known` touches
    /// `pattern`, returning its revision, or `None` after `timeout`.
    ///
    /// # Errors
    /// As [`Repository::watch_listener`], plus [`Error::ShuttingDown`]
    /// when the repository closes mid-wait.
    pub fn watch(
        &self,
        last_known: Revision,
        pattern: &PathPattern,
        timeout: Duration,
    ) -> Result<Option<Revision>> {
        self.watch_listener(last_known, pattern)?.wait(timeout)
    }

    /// Long-poll a single file: completes when the file's content changes,
    /// appears, or is removed. A watch on a currently-missing path
    /// completes when the path first appears.
    ///
    /// # Errors
    /// As [`Repository::watch`]; additionally [`Error::EntryNotFound`]
    /// when the watch woke up because the file was removed.
    pub fn watch_file(
        &self,
        last_known: Revision,
        path: &FilePath,
        timeout: Duration,
    ) -> Result<Option<(Revision, Entry)>> {
        let pattern = PathPattern::new(path.as_str())?;
        match self.watch(last_known, &pattern, timeout)? {
            Some(revision) => {
                let entry = self.get(revision, path)?;
                Ok(Some((revision, entry)))
            }
            None => Ok(None),
        }
    }
}
