//! The project/repository manager.
//!
//! Owns the on-disk layout and a weighted cache of open repository
//! instances:
//!
//! ```text
//! <data_dir>/
//! ├── <project>/
//! │   ├── project.json
//! │   ├── dogma.git/            ← plaintext backend
//! │   ├── meta.git/
//! │   └── <repo>.cipher/        ← encrypted backend
//! └── <project>.removed/        ← soft-deleted project
//! ```
//!
//! Soft deletion renames a directory to its `.removed` twin; `unremove`
//! renames it back; `purge` deletes the bytes. Lifecycle operations
//! serialize on a per-name logical lock, never on the read path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::{info, warn};

use dogma_core::{Author, Repository};
use dogma_git::{CipherStore, GixStore, Kek, ObjectStore, StoreError, migrate_store};

use crate::error::{Result, ServerError};
use crate::project::{DOGMA_REPO, META_REPO, Project, REMOVED_SUFFIX, validate_name};

/// How a repository instance is weighed in the cache.
pub type RepositoryWeigher = Arc<dyn Fn(&str, &Arc<Repository>) -> u32 + Send + Sync>;

/// How long a purge waits for in-flight work before giving up.
const QUIESCE_TIMEOUT: Duration = Duration::from_secs(10);

/// The cached mapping of names to live [`Repository`] instances plus the
/// project/repository lifecycle.
pub struct ProjectManager {
    root: PathBuf,
    kek: Option<Kek>,
    purge_grace: Duration,
    cache: Cache<String, Arc<Repository>>,
    name_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProjectManager {
    /// Open (creating the data root if needed) a manager over `root`.
    ///
    /// `max_weight` bounds the instance cache as measured by `weigher`;
    /// the default weigher counts every repository as 1, making
    /// `max_weight` an entry count.
    ///
    /// # Errors
    /// I/O errors creating the data root.
    pub fn open(
        root: &Path,
        kek: Option<Kek>,
        purge_grace: Duration,
        max_weight: u64,
        weigher: Option<RepositoryWeigher>,
    ) -> Result<Self> {
        fs::create_dir_all(root)?;
        let weigher = weigher.unwrap_or_else(|| Arc::new(|_: &str, _: &Arc<Repository>| 1u32));
        let cache = Cache::builder()
            .max_capacity(max_weight)
            .weigher(move |key: &String, value: &Arc<Repository>| weigher(key, value))
            .eviction_listener(|_key, value: Arc<Repository>, _cause| {
                // Evicted instances stop watchers; the bytes stay on disk
                // and the repository reopens on the next access.
                value.close();
            })
            .build();
        Ok(Self {
            root: root.to_path_buf(),
            kek,
            purge_grace,
            cache,
            name_locks: DashMap::new(),
        })
    }

    fn name_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.name_locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    fn project_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn removed_project_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}{REMOVED_SUFFIX}"))
    }

    /// Create a project with its `dogma` and `meta` repositories.
    ///
    /// # Errors
    /// [`ServerError::ProjectExists`] on collision (live or removed).
    pub fn create_project(
        &self,
        name: &str,
        author: &Author,
        timestamp_millis: i64,
    ) -> Result<Project> {
        validate_name(name)?;
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        if self.project_dir(name).exists() || self.removed_project_dir(name).exists() {
            return Err(ServerError::ProjectExists {
                name: name.to_owned(),
            });
        }
        fs::create_dir_all(self.project_dir(name))?;
        let project = Project {
            name: name.to_owned(),
            creator: author.clone(),
            created_at: timestamp_millis,
        };
        let metadata = serde_json::to_vec_pretty(&project).map_err(|e| StoreError::Backend {
            message: format!("failed to serialize project metadata: {e}"),
        })?;
        fs::write(self.project_dir(name).join("project.json"), metadata)?;

        for repo in [DOGMA_REPO, META_REPO] {
            self.create_repository_unlocked(name, repo, author, timestamp_millis, false)?;
        }
        info!(project = name, "created project");
        Ok(project)
    }

    /// Load a project's metadata.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when the project does not exist or
    /// is soft-removed.
    pub fn project(&self, name: &str) -> Result<Project> {
        let path = self.project_dir(name).join("project.json");
        let bytes = fs::read(&path).map_err(|_| ServerError::ProjectNotFound {
            name: name.to_owned(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ServerError::Store(StoreError::Backend {
                message: format!("corrupt project.json for {name}: {e}"),
            })
        })
    }

    /// List live project names, sorted.
    ///
    /// # Errors
    /// I/O errors reading the data root.
    pub fn list_projects(&self) -> Result<Vec<String>> {
        self.list_dirs(&self.root, |name| !name.ends_with(REMOVED_SUFFIX))
    }

    /// List soft-removed project names, sorted.
    ///
    /// # Errors
    /// I/O errors reading the data root.
    pub fn list_removed_projects(&self) -> Result<Vec<String>> {
        Ok(self
            .list_dirs(&self.root, |name| name.ends_with(REMOVED_SUFFIX))?
            .into_iter()
            .map(|name| name.trim_end_matches(REMOVED_SUFFIX).to_owned())
            .collect())
    }

    /// Soft-delete a project: it disappears from `list_projects` but stays
    /// restorable until purged.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when the project does not exist.
    pub fn remove_project(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        if !self.project_dir(name).exists() {
            return Err(ServerError::ProjectNotFound {
                name: name.to_owned(),
            });
        }
        for repo in self.list_repositories(name)? {
            self.evict(name, &repo);
        }
        fs::rename(self.project_dir(name), self.removed_project_dir(name))?;
        info!(project = name, "removed project (soft)");
        Ok(())
    }

    /// Restore a soft-removed project.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when nothing is removed under this
    /// name; [`ServerError::ProjectExists`] when a live project shadows it.
    pub fn unremove_project(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        if self.project_dir(name).exists() {
            return Err(ServerError::ProjectExists {
                name: name.to_owned(),
            });
        }
        if !self.removed_project_dir(name).exists() {
            return Err(ServerError::ProjectNotFound {
                name: name.to_owned(),
            });
        }
        fs::rename(self.removed_project_dir(name), self.project_dir(name))?;
        info!(project = name, "unremoved project");
        Ok(())
    }

    /// Permanently delete a soft-removed project.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when nothing is removed under this
    /// name.
    pub fn purge_project(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock();

        let dir = self.removed_project_dir(name);
        if !dir.exists() {
            return Err(ServerError::ProjectNotFound {
                name: name.to_owned(),
            });
        }
        fs::remove_dir_all(dir)?;
        info!(project = name, "purged project");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------------

    fn repo_dir(&self, project: &str, name: &str) -> PathBuf {
        self.project_dir(project).join(format!("{name}.git"))
    }

    fn cipher_repo_dir(&self, project: &str, name: &str) -> PathBuf {
        self.project_dir(project).join(format!("{name}.cipher"))
    }

    fn any_repo_dir(&self, project: &str, name: &str) -> Option<PathBuf> {
        let git = self.repo_dir(project, name);
        if git.exists() {
            return Some(git);
        }
        let cipher = self.cipher_repo_dir(project, name);
        if cipher.exists() {
            return Some(cipher);
        }
        None
    }

    fn removed_twin(dir: &Path) -> PathBuf {
        let mut removed = dir.as_os_str().to_owned();
        removed.push(REMOVED_SUFFIX);
        PathBuf::from(removed)
    }

    fn cache_key(project: &str, name: &str) -> String {
        format!("{project}/{name}")
    }

    /// Create a repository in a project.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`], [`ServerError::RepositoryExists`],
    /// or a cipher error when `encrypted` is requested without a KEK.
    pub fn create_repository(
        &self,
        project: &str,
        name: &str,
        author: &Author,
        timestamp_millis: i64,
        encrypted: bool,
    ) -> Result<Arc<Repository>> {
        validate_name(name)?;
        if !self.project_dir(project).exists() {
            return Err(ServerError::ProjectNotFound {
                name: project.to_owned(),
            });
        }
        let lock = self.name_lock(&Self::cache_key(project, name));
        let _guard = lock.lock();
        self.create_repository_unlocked(project, name, author, timestamp_millis, encrypted)
    }

    fn create_repository_unlocked(
        &self,
        project: &str,
        name: &str,
        author: &Author,
        timestamp_millis: i64,
        encrypted: bool,
    ) -> Result<Arc<Repository>> {
        let exists = self.any_repo_dir(project, name).is_some()
            || Self::removed_twin(&self.repo_dir(project, name)).exists()
            || Self::removed_twin(&self.cipher_repo_dir(project, name)).exists();
        if exists {
            return Err(ServerError::RepositoryExists {
                project: project.to_owned(),
                name: name.to_owned(),
            });
        }

        let store: Arc<dyn ObjectStore> = if encrypted {
            let kek = self.kek()?;
            Arc::new(CipherStore::create(
                &self.cipher_repo_dir(project, name),
                kek,
            )?)
        } else {
            Arc::new(GixStore::init(&self.repo_dir(project, name))?)
        };
        let repository = Arc::new(Repository::create(
            store,
            project,
            name,
            author,
            timestamp_millis,
        )?);
        self.cache
            .insert(Self::cache_key(project, name), Arc::clone(&repository));
        info!(project, repository = name, encrypted, "created repository");
        Ok(repository)
    }

    /// Resolve a live repository instance, opening and caching it if
    /// needed.
    ///
    /// # Errors
    /// [`ServerError::RepositoryNotFound`] when the repository does not
    /// exist or is soft-removed.
    pub fn repository(&self, project: &str, name: &str) -> Result<Arc<Repository>> {
        let key = Self::cache_key(project, name);
        if let Some(repository) = self.cache.get(&key) {
            if !repository.is_closed() {
                return Ok(repository);
            }
            self.cache.invalidate(&key);
        }

        let repository = self.open_repository(project, name)?;
        self.cache.insert(key, Arc::clone(&repository));
        Ok(repository)
    }

    fn open_repository(&self, project: &str, name: &str) -> Result<Arc<Repository>> {
        let git = self.repo_dir(project, name);
        let cipher = self.cipher_repo_dir(project, name);
        let store: Arc<dyn ObjectStore> = if git.exists() {
            Arc::new(GixStore::open(&git)?)
        } else if cipher.exists() {
            Arc::new(CipherStore::open(&cipher, self.kek()?)?)
        } else {
            return Err(ServerError::RepositoryNotFound {
                project: project.to_owned(),
                name: name.to_owned(),
            });
        };
        Ok(Arc::new(Repository::open(store, project, name)?))
    }

    /// List live repository names in a project, sorted.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when the project does not exist.
    pub fn list_repositories(&self, project: &str) -> Result<Vec<String>> {
        if !self.project_dir(project).exists() {
            return Err(ServerError::ProjectNotFound {
                name: project.to_owned(),
            });
        }
        let mut out = Vec::new();
        for name in self.list_dirs(&self.project_dir(project), |_| true)? {
            if let Some(stem) = name.strip_suffix(".git").or_else(|| name.strip_suffix(".cipher"))
            {
                out.push(stem.to_owned());
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// List soft-removed repository names in a project, sorted.
    ///
    /// # Errors
    /// [`ServerError::ProjectNotFound`] when the project does not exist.
    pub fn list_removed_repositories(&self, project: &str) -> Result<Vec<String>> {
        if !self.project_dir(project).exists() {
            return Err(ServerError::ProjectNotFound {
                name: project.to_owned(),
            });
        }
        let mut out = Vec::new();
        for name in self.list_dirs(&self.project_dir(project), |name| {
            name.ends_with(REMOVED_SUFFIX)
        })? {
            let stem = name.trim_end_matches(REMOVED_SUFFIX);
            if let Some(stem) = stem.strip_suffix(".git").or_else(|| stem.strip_suffix(".cipher"))
            {
                out.push(stem.to_owned());
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Soft-delete a repository. Outstanding watchers complete with
    /// `ShuttingDown`.
    ///
    /// # Errors
    /// [`ServerError::InvalidName`] for the well-known repositories;
    /// [`ServerError::RepositoryNotFound`]; [`ServerError::Timeout`] when
    /// an in-flight commit does not drain in time.
    pub fn remove_repository(&self, project: &str, name: &str) -> Result<()> {
        if name == DOGMA_REPO || name == META_REPO {
            return Err(ServerError::InvalidName {
                name: name.to_owned(),
                reason: "well-known repositories cannot be removed".to_owned(),
            });
        }
        let lock = self.name_lock(&Self::cache_key(project, name));
        let _guard = lock.lock();

        let Some(dir) = self.any_repo_dir(project, name) else {
            return Err(ServerError::RepositoryNotFound {
                project: project.to_owned(),
                name: name.to_owned(),
            });
        };
        self.quiesce_and_evict(project, name)?;
        fs::rename(&dir, Self::removed_twin(&dir))?;
        info!(project, repository = name, "removed repository (soft)");
        Ok(())
    }

    /// Restore a soft-removed repository.
    ///
    /// # Errors
    /// [`ServerError::RepositoryNotFound`] when nothing is removed under
    /// this name; [`ServerError::RepositoryExists`] when a live repository
    /// shadows it.
    pub fn unremove_repository(&self, project: &str, name: &str) -> Result<()> {
        let lock = self.name_lock(&Self::cache_key(project, name));
        let _guard = lock.lock();

        if self.any_repo_dir(project, name).is_some() {
            return Err(ServerError::RepositoryExists {
                project: project.to_owned(),
                name: name.to_owned(),
            });
        }
        for dir in [
            self.repo_dir(project, name),
            self.cipher_repo_dir(project, name),
        ] {
            let removed = Self::removed_twin(&dir);
            if removed.exists() {
                fs::rename(removed, dir)?;
                info!(project, repository = name, "unremoved repository");
                return Ok(());
            }
        }
        Err(ServerError::RepositoryNotFound {
            project: project.to_owned(),
            name: name.to_owned(),
        })
    }

    /// Permanently delete a soft-removed repository.
    ///
    /// # Errors
    /// [`ServerError::RepositoryNotFound`] when nothing is removed under
    /// this name.
    pub fn purge_repository(&self, project: &str, name: &str) -> Result<()> {
        let lock = self.name_lock(&Self::cache_key(project, name));
        let _guard = lock.lock();

        for dir in [
            self.repo_dir(project, name),
            self.cipher_repo_dir(project, name),
        ] {
            let removed = Self::removed_twin(&dir);
            if removed.exists() {
                fs::remove_dir_all(removed)?;
                info!(project, repository = name, "purged repository");
                return Ok(());
            }
        }
        Err(ServerError::RepositoryNotFound {
            project: project.to_owned(),
            name: name.to_owned(),
        })
    }

    /// Delete every soft-removed project and repository older than the
    /// grace period. Returns how many were purged.
    ///
    /// # Errors
    /// I/O errors enumerating the layout.
    pub fn purge_stale(&self) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(self.purge_grace)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut purged = 0;

        for project in self.list_removed_projects()? {
            let dir = self.removed_project_dir(&project);
            if dir_older_than(&dir, cutoff)? {
                fs::remove_dir_all(&dir)?;
                info!(project = %project, "purged stale project");
                purged += 1;
            }
        }
        for project in self.list_projects()? {
            for repository in self.list_removed_repositories(&project)? {
                for dir in [
                    self.repo_dir(&project, &repository),
                    self.cipher_repo_dir(&project, &repository),
                ] {
                    let removed = Self::removed_twin(&dir);
                    if removed.exists() && dir_older_than(&removed, cutoff)? {
                        fs::remove_dir_all(&removed)?;
                        info!(project = %project, repository = %repository, "purged stale repository");
                        purged += 1;
                    }
                }
            }
        }
        Ok(purged)
    }

    /// Convert a plaintext repository to the encrypted backend in place.
    /// History, revisions, and object ids are preserved.
    ///
    /// # Errors
    /// [`ServerError::RepositoryNotFound`] when there is no plaintext
    /// repository; cipher errors when no KEK is configured.
    pub fn migrate_to_encrypted(&self, project: &str, name: &str) -> Result<()> {
        let kek = self.kek()?.clone();
        let lock = self.name_lock(&Self::cache_key(project, name));
        let _guard = lock.lock();

        let git_dir = self.repo_dir(project, name);
        if !git_dir.exists() {
            return Err(ServerError::RepositoryNotFound {
                project: project.to_owned(),
                name: name.to_owned(),
            });
        }
        self.quiesce_and_evict(project, name)?;

        let cipher_dir = self.cipher_repo_dir(project, name);
        let staging = cipher_dir.with_extension("cipher.migrating");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        let src = GixStore::open(&git_dir)?;
        let dst = CipherStore::create(&staging, &kek)?;
        let copied = migrate_store(&src, &dst)?;
        drop(dst);

        fs::rename(&staging, &cipher_dir)?;
        fs::remove_dir_all(&git_dir)?;
        info!(project, repository = name, commits = copied, "migrated repository to encrypted backend");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn kek(&self) -> Result<&Kek> {
        self.kek.as_ref().ok_or_else(|| {
            ServerError::Store(StoreError::Cipher {
                message: "encrypted repositories require a configured KEK".to_owned(),
            })
        })
    }

    fn evict(&self, project: &str, name: &str) {
        let key = Self::cache_key(project, name);
        if let Some(repository) = self.cache.get(&key) {
            repository.close();
        }
        self.cache.invalidate(&key);
    }

    /// Close the cached instance (waking watchers), wait for in-flight
    /// work, and drop it from the cache.
    fn quiesce_and_evict(&self, project: &str, name: &str) -> Result<()> {
        let key = Self::cache_key(project, name);
        if let Some(repository) = self.cache.get(&key) {
            repository.close();
            if !repository.quiesce(QUIESCE_TIMEOUT) {
                warn!(project, repository = name, "repository did not quiesce");
                return Err(ServerError::Timeout {
                    millis: u64::try_from(QUIESCE_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }
        self.cache.invalidate(&key);
        Ok(())
    }

    fn list_dirs(&self, path: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep(&name) {
                out.push(name);
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}

fn dir_older_than(dir: &Path, cutoff: SystemTime) -> Result<bool> {
    let modified = fs::metadata(dir)?.modified()?;
    Ok(modified < cutoff)
}
