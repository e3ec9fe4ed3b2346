//! gix-backed ref operations.
//!
//! Ref CAS goes through `Repository::reference` with a
//! [`PreviousValue`](gix::refs::transaction::PreviousValue) expectation; git's
//! internal ref locking makes the update atomic. A preemptive read produces
//! precise [`StoreError::RefConflict`] messages — the transaction error gix
//! reports on a loose-ref CAS failure does not identify the mismatch, so
//! classifying it after the fact is best-effort string matching.

use crate::error::StoreError;
use crate::gix_store::GixStore;
use crate::objects_impl::{from_gix_oid, to_gix_oid};
use crate::types::{Expectation, Oid, RefName};

/// The `HEAD` symbolic ref.
#[must_use]
pub fn head() -> RefName {
    RefName::known("HEAD")
}

/// The single branch every dogma repository carries.
#[must_use]
pub fn master() -> RefName {
    RefName::known("refs/heads/master")
}

pub fn read_ref(store: &GixStore, name: &RefName) -> Result<Option<Oid>, StoreError> {
    let repo = store.local();
    let Some(mut reference) =
        repo.try_find_reference(name.as_str())
            .map_err(|e| StoreError::Backend {
                message: format!("failed to look up ref {name}: {e}"),
            })?
    else {
        return Ok(None);
    };
    let id = reference
        .peel_to_id_in_place()
        .map_err(|e| StoreError::Backend {
            message: format!("failed to peel ref {name}: {e}"),
        })?;
    Ok(Some(from_gix_oid(id.detach())?))
}

pub fn update_ref(
    store: &GixStore,
    name: &RefName,
    new: Oid,
    expected: Expectation,
) -> Result<(), StoreError> {
    use gix::refs::transaction::PreviousValue;

    // Preemptive check for a precise conflict message; the transaction below
    // still enforces the expectation atomically at the git layer.
    let current = read_ref(store, name)?;
    match (expected, current) {
        (Expectation::MustNotExist, Some(oid)) => {
            return Err(StoreError::RefConflict {
                ref_name: name.to_string(),
                message: format!("ref already exists at {oid}"),
            });
        }
        (Expectation::MustMatch(want), Some(have)) if want != have => {
            return Err(StoreError::RefConflict {
                ref_name: name.to_string(),
                message: format!("expected {want}, found {have}"),
            });
        }
        (Expectation::MustMatch(want), None) => {
            return Err(StoreError::RefConflict {
                ref_name: name.to_string(),
                message: format!("expected {want}, found no ref"),
            });
        }
        _ => {}
    }

    let previous = match expected {
        Expectation::MustNotExist => PreviousValue::MustNotExist,
        Expectation::MustMatch(oid) => {
            PreviousValue::MustExistAndMatch(gix::refs::Target::from(to_gix_oid(oid)))
        }
        Expectation::Any => PreviousValue::Any,
    };

    let repo = store.local();
    repo.reference(name.as_str(), to_gix_oid(new), previous, "dogma: update-ref")
        .map_err(|e| classify_edit_error(name, &e.to_string()))?;
    Ok(())
}

pub fn set_symbolic_ref(
    store: &GixStore,
    name: &RefName,
    target: &RefName,
) -> Result<(), StoreError> {
    use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};

    let repo = store.local();
    let full_name: gix::refs::FullName =
        name.as_str().try_into().map_err(|e| StoreError::Backend {
            message: format!("invalid ref name {name}: {e}"),
        })?;
    let target_name: gix::refs::FullName =
        target.as_str().try_into().map_err(|e| StoreError::Backend {
            message: format!("invalid ref name {target}: {e}"),
        })?;

    repo.edit_reference(RefEdit {
        change: Change::Update {
            log: LogChange {
                mode: RefLog::AndReference,
                force_create_reflog: false,
                message: "dogma: set symbolic ref".into(),
            },
            expected: PreviousValue::Any,
            new: gix::refs::Target::Symbolic(target_name),
        },
        name: full_name,
        deref: false,
    })
    .map_err(|e| StoreError::Backend {
        message: format!("failed to set symbolic ref {name} -> {target}: {e}"),
    })?;
    Ok(())
}

pub fn list_refs(store: &GixStore, prefix: &str) -> Result<Vec<(RefName, Oid)>, StoreError> {
    let repo = store.local();
    let platform = repo.references().map_err(|e| StoreError::Backend {
        message: format!("failed to open ref iterator: {e}"),
    })?;
    let iter = platform.prefixed(prefix).map_err(|e| StoreError::Backend {
        message: format!("failed to list refs under '{prefix}': {e}"),
    })?;

    let mut out = Vec::new();
    for result in iter {
        let reference = result.map_err(|e| StoreError::Backend {
            message: format!("failed to read ref: {e}"),
        })?;
        let full_name = reference.name().as_bstr().to_string();
        // Symbolic refs (only HEAD in practice) are not part of a listing.
        let Some(id) = reference.try_id() else {
            continue;
        };
        let name = RefName::new(&full_name).map_err(|e| StoreError::Backend {
            message: format!("backend returned unusable ref name: {e}"),
        })?;
        out.push((name, from_gix_oid(id.detach())?));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

pub fn rename_ref(store: &GixStore, old: &RefName, new: &RefName) -> Result<(), StoreError> {
    let oid = read_ref(store, old)?.ok_or_else(|| StoreError::ObjectNotFound {
        message: format!("ref {old} does not exist"),
    })?;
    update_ref(store, new, oid, Expectation::MustNotExist)?;
    delete_ref(store, old)
}

pub fn delete_ref(store: &GixStore, name: &RefName) -> Result<(), StoreError> {
    let repo = store.local();
    match repo
        .try_find_reference(name.as_str())
        .map_err(|e| StoreError::Backend {
            message: format!("failed to look up ref {name}: {e}"),
        })? {
        Some(reference) => reference.delete().map_err(|e| StoreError::Backend {
            message: format!("failed to delete ref {name}: {e}"),
        }),
        None => Ok(()),
    }
}

fn classify_edit_error(name: &RefName, message: &str) -> StoreError {
    let lowered = message.to_lowercase();
    if lowered.contains("match") || lowered.contains("exist") || lowered.contains("out of date") {
        StoreError::RefConflict {
            ref_name: name.to_string(),
            message: message.to_owned(),
        }
    } else {
        StoreError::Backend {
            message: format!("failed to update ref {name}: {message}"),
        }
    }
}
