//! JSON and text patch application and generation.
//!
//! JSON patches are RFC 6902 documents; text patches are unified diffs.
//! Both directions are used: `diff` produces patches for modified entries,
//! `commit` applies caller-supplied patches. A patch that does not apply
//! cleanly is a [`Error::ChangeConflict`]; a patch that cannot even be
//! parsed is an [`Error::InvalidArgument`].

use serde_json::Value;

use crate::error::Error;

/// Apply an RFC 6902 patch to `base` (`None` applies against JSON `null`,
/// letting a patch create a document from nothing).
///
/// # Errors
/// [`Error::InvalidArgument`] for a malformed patch document;
/// [`Error::ChangeConflict`] when the patch does not apply.
pub fn apply_json_patch(base: Option<&Value>, patch: &Value) -> Result<Value, Error> {
    let patch: json_patch::Patch = serde_json::from_value(patch.clone())
        .map_err(|e| Error::invalid(format!("malformed JSON patch: {e}")))?;
    let mut doc = base.cloned().unwrap_or(Value::Null);
    json_patch::patch(&mut doc, &patch)
        .map_err(|e| Error::conflict(format!("JSON patch failed: {e}")))?;
    Ok(doc)
}

/// Produce an RFC 6902 patch turning `old` into `new`.
///
/// # Panics
/// Never — patch documents always serialize.
#[must_use]
pub fn diff_json(old: &Value, new: &Value) -> Value {
    let patch = json_patch::diff(old, new);
    #[allow(clippy::unwrap_used)]
    serde_json::to_value(patch).unwrap()
}

/// Apply a unified-format patch to `base`.
///
/// # Errors
/// [`Error::InvalidArgument`] for an unparsable patch;
/// [`Error::ChangeConflict`] when a hunk does not apply.
pub fn apply_text_patch(base: &str, patch: &str) -> Result<String, Error> {
    let parsed = diffy::Patch::from_str(patch)
        .map_err(|e| Error::invalid(format!("malformed text patch: {e}")))?;
    diffy::apply(base, &parsed).map_err(|e| Error::conflict(format!("text patch failed: {e}")))
}

/// Produce a unified-format patch turning `old` into `new`.
#[must_use]
pub fn diff_text(old: &str, new: &str) -> String {
    diffy::create_patch(old, new).to_string()
}
