//! dogma-git — the object-store layer of dogma.
//!
//! Everything above this crate talks to storage through the
//! [`ObjectStore`] trait. Two backends implement it:
//!
//! - [`GixStore`]: a standard bare git repository (the canonical layout,
//!   interoperable with git tooling and remote mirrors);
//! - [`CipherStore`]: an encrypted key-value store whose object payloads
//!   are sealed with a per-repository DEK wrapped by the process KEK.
//!
//! Both address objects by the SHA-1 of the plaintext git-format object,
//! so ids are stable across backends and [`migrate_store`] can convert a
//! repository without rewriting history.

mod cipher_store;
mod crypto;
mod error;
mod format;
mod gix_store;
mod migrate;
mod objects_impl;
mod refs_impl;
mod store;
mod types;

pub use cipher_store::CipherStore;
pub use crypto::{KEY_LEN, Kek};
pub use error::StoreError;
pub use gix_store::GixStore;
pub use migrate::migrate_store;
pub use store::ObjectStore;
pub use types::{
    CommitRecord, Expectation, Identity, NodeKind, Oid, OidParseError, RefName, RefNameError,
    TreeEdit, TreeEntry,
};
