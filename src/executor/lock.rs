//! The cluster-wide logical lock table.
//!
//! Push commands take a per-repository lock; project/repository lifecycle
//! commands take the global lock. The global lock excludes every
//! repository lock (and vice versa) so a lifecycle operation never races a
//! push on the repository it is renaming: pushes hold the global lock
//! shared, lifecycle holds it exclusive.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, ServerError};

/// What a command locks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// The whole cluster — project/repository lifecycle.
    Global,
    /// One repository — pushes.
    Repository {
        /// Parent project.
        project: String,
        /// Repository name.
        repository: String,
    },
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("<global>"),
            Self::Repository {
                project,
                repository,
            } => write!(f, "{project}/{repository}"),
        }
    }
}

/// The logical lock table.
#[derive(Default)]
pub struct LockTable {
    global: RwLock<()>,
    repositories: DashMap<String, Arc<Mutex<()>>>,
}

/// A held logical lock; released on drop.
pub struct LockGuard<'a> {
    _global_shared: Option<parking_lot::RwLockReadGuard<'a, ()>>,
    _global_exclusive: Option<parking_lot::RwLockWriteGuard<'a, ()>>,
    _repository: Option<parking_lot::ArcMutexGuard<parking_lot::RawMutex, ()>>,
}

impl LockTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `key`, waiting up to `timeout`.
    ///
    /// # Errors
    /// [`ServerError::LockBusy`] when the lock cannot be acquired in time.
    pub fn acquire(&self, key: &LockKey, timeout: Duration) -> Result<LockGuard<'_>> {
        let busy = || ServerError::LockBusy {
            key: key.to_string(),
        };
        match key {
            LockKey::Global => {
                let guard = self.global.try_write_for(timeout).ok_or_else(busy)?;
                Ok(LockGuard {
                    _global_shared: None,
                    _global_exclusive: Some(guard),
                    _repository: None,
                })
            }
            LockKey::Repository {
                project,
                repository,
            } => {
                let shared = self.global.try_read_for(timeout).ok_or_else(busy)?;
                let slot = self
                    .repositories
                    .entry(format!("{project}/{repository}"))
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                let guard = slot.try_lock_arc_for(timeout).ok_or_else(busy)?;
                Ok(LockGuard {
                    _global_shared: Some(shared),
                    _global_exclusive: None,
                    _repository: Some(guard),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn distinct_repositories_do_not_contend() {
        let table = LockTable::new();
        let a = table
            .acquire(
                &LockKey::Repository {
                    project: "p".to_owned(),
                    repository: "r1".to_owned(),
                },
                SHORT,
            )
            .expect("first");
        let b = table.acquire(
            &LockKey::Repository {
                project: "p".to_owned(),
                repository: "r2".to_owned(),
            },
            SHORT,
        );
        assert!(b.is_ok());
        drop(a);
    }

    #[test]
    fn same_repository_contends() {
        let table = LockTable::new();
        let key = LockKey::Repository {
            project: "p".to_owned(),
            repository: "r".to_owned(),
        };
        let held = table.acquire(&key, SHORT).expect("first");
        assert!(matches!(
            table.acquire(&key, SHORT),
            Err(ServerError::LockBusy { .. })
        ));
        drop(held);
        assert!(table.acquire(&key, SHORT).is_ok());
    }

    #[test]
    fn global_excludes_repository_locks() {
        let table = LockTable::new();
        let global = table.acquire(&LockKey::Global, SHORT).expect("global");
        assert!(matches!(
            table.acquire(
                &LockKey::Repository {
                    project: "p".to_owned(),
                    repository: "r".to_owned(),
                },
                SHORT
            ),
            Err(ServerError::LockBusy { .. })
        ));
        drop(global);
    }
}
