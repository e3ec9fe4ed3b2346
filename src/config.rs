//! Server configuration (`dogma.toml`).
//!
//! Typed configuration with defaulted fields. A missing file yields all
//! defaults (no error); unknown keys are rejected so typos surface at
//! startup rather than as silently-ignored settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use dogma_git::{KEY_LEN, Kek};

use crate::error::{Result, ServerError};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DogmaConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Replication settings.
    #[serde(default)]
    pub replication: ReplicationConfig,

    /// Timeouts and limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Encryption-at-rest settings. Absent means the encrypted backend is
    /// unavailable.
    #[serde(default)]
    pub encryption: Option<EncryptionConfig>,
}

impl DogmaConfig {
    /// Load configuration from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// I/O errors other than not-found, and parse errors.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ServerError::Io(e)),
        };
        toml::from_str(&text).map_err(|e| ServerError::InvalidName {
            name: path.display().to_string(),
            reason: format!("failed to parse config: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Storage settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory for all projects.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum total weight of the repository instance cache, as measured
    /// by the manager's weigher.
    #[serde(default = "default_cache_weight")]
    pub repository_cache_max_weight: u64,

    /// How long a soft-removed project or repository stays restorable
    /// before a purge sweep may delete it.
    #[serde(default = "default_purge_grace_secs")]
    pub purge_grace_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            repository_cache_max_weight: default_cache_weight(),
            purge_grace_secs: default_purge_grace_secs(),
        }
    }
}

impl StorageConfig {
    /// The purge grace period as a [`Duration`].
    #[must_use]
    pub const fn purge_grace(&self) -> Duration {
        Duration::from_secs(self.purge_grace_secs)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_cache_weight() -> u64 {
    1024
}

/// Seven days.
const fn default_purge_grace_secs() -> u64 {
    7 * 24 * 60 * 60
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// Replication settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    /// This replica's identity in the cluster.
    #[serde(default = "default_replica_id")]
    pub replica_id: String,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replica_id: default_replica_id(),
        }
    }
}

fn default_replica_id() -> String {
    "replica-1".to_owned()
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Timeouts and limits.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Per-command deadline, seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Default long-poll watch timeout, seconds.
    #[serde(default = "default_watch_timeout_secs")]
    pub watch_timeout_secs: u64,

    /// Upper bound a client may request for a watch timeout, seconds.
    #[serde(default = "default_watch_timeout_max_secs")]
    pub watch_timeout_max_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            watch_timeout_secs: default_watch_timeout_secs(),
            watch_timeout_max_secs: default_watch_timeout_max_secs(),
        }
    }
}

impl LimitsConfig {
    /// The per-command deadline as a [`Duration`].
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Clamp a client-requested watch timeout to the configured ceiling,
    /// falling back to the default when none was requested.
    #[must_use]
    pub fn clamp_watch_timeout(&self, requested: Option<Duration>) -> Duration {
        let ceiling = Duration::from_secs(self.watch_timeout_max_secs);
        requested
            .unwrap_or_else(|| Duration::from_secs(self.watch_timeout_secs))
            .min(ceiling)
    }
}

const fn default_command_timeout_secs() -> u64 {
    60
}

const fn default_watch_timeout_secs() -> u64 {
    120
}

const fn default_watch_timeout_max_secs() -> u64 {
    600
}

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

/// Encryption-at-rest settings: the process-wide KEK.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Rotation version of the active KEK.
    pub kek_version: u32,
    /// KEK material, 64 hex characters (32 bytes).
    pub kek_hex: String,
}

impl EncryptionConfig {
    /// Decode the configured KEK.
    ///
    /// # Errors
    /// [`ServerError::InvalidName`] when the hex is malformed or the wrong
    /// length.
    pub fn kek(&self) -> Result<Kek> {
        let bad = |reason: &str| ServerError::InvalidName {
            name: "encryption.kek_hex".to_owned(),
            reason: reason.to_owned(),
        };
        if self.kek_hex.len() != KEY_LEN * 2 {
            return Err(bad("expected 64 hex characters"));
        }
        let mut key = [0u8; KEY_LEN];
        for (i, chunk) in self.kek_hex.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk).map_err(|_| bad("not ASCII hex"))?;
            key[i] = u8::from_str_radix(hex, 16).map_err(|_| bad("not ASCII hex"))?;
        }
        Ok(Kek::new(self.kek_version, key))
    }
}
