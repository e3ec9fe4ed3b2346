//! dogma — a highly-available, version-controlled repository service for
//! small JSON/text configuration files.
//!
//! This crate is the service layer over [`dogma_core`] (the commit engine,
//! queries, and watch) and [`dogma_git`] (the object-store backends): the
//! project/repository manager with soft deletion and an instance cache,
//! the tagged [`command::Command`] union, and the standalone and
//! replicated command executors that serialize all mutation.
//!
//! The HTTP surface, web UI, authentication, and mirror workers are
//! external collaborators; they consume the [`executor::CommandExecutor`],
//! [`dogma_core::Repository`], and watch interfaces exported here.

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod project;
pub mod session;
pub mod telemetry;

pub use command::{Command, CommandKind, CommandResult, ServerStatus};
pub use config::DogmaConfig;
pub use error::{Result, ServerError};
pub use executor::{
    CommandExecutor, InMemoryLog, LockKey, LockTable, LogEntry, ReplicatedCommandExecutor,
    ReplicationLog, ServerState, StandaloneCommandExecutor,
};
pub use manager::{ProjectManager, RepositoryWeigher};
pub use project::{DOGMA_REPO, META_REPO, Project};
pub use session::{Session, SessionStore};
