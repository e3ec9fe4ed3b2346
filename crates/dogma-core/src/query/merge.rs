//! Merge queries — combine several JSON files into one document.
//!
//! Sources are merged left to right in the caller's declared order: objects
//! merge deeply with the right side winning on conflict, arrays and scalars
//! are replaced outright. Optional sources that are missing are skipped; a
//! missing required source fails the whole query. An optional JSON-path
//! filter runs after merging.

use serde_json::Value;

use crate::error::Error;
use crate::path::FilePath;
use crate::query::Query;

/// One source of a [`MergeQuery`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSource {
    /// Path of a JSON file.
    pub path: FilePath,
    /// Skip silently when the file does not exist.
    pub optional: bool,
}

impl MergeSource {
    /// A required source — the merge fails if it is missing.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid or non-`.json` path.
    pub fn required(path: &str) -> Result<Self, Error> {
        Self::build(path, false)
    }

    /// An optional source — skipped if missing.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid or non-`.json` path.
    pub fn optional(path: &str) -> Result<Self, Error> {
        Self::build(path, true)
    }

    fn build(path: &str, optional: bool) -> Result<Self, Error> {
        let path = FilePath::new(path)?;
        if !path.is_json() {
            return Err(Error::invalid(format!(
                "merge sources must be .json files: {path}"
            )));
        }
        Ok(Self { path, optional })
    }
}

/// An ordered merge of JSON sources with an optional JSON-path postfilter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeQuery {
    /// Sources, in merge order (later wins).
    pub sources: Vec<MergeSource>,
    /// JSON-path expressions applied to the merged document, in order.
    pub expressions: Vec<String>,
}

impl MergeQuery {
    /// A merge query without a postfilter.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] when `sources` is empty.
    pub fn new(sources: Vec<MergeSource>) -> Result<Self, Error> {
        if sources.is_empty() {
            return Err(Error::invalid("merge query requires at least one source"));
        }
        Ok(Self {
            sources,
            expressions: Vec::new(),
        })
    }

    /// Add a JSON-path postfilter expression.
    #[must_use]
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expressions.push(expression.into());
        self
    }

    /// Apply the postfilter (if any) to a merged document.
    ///
    /// # Errors
    /// [`Error::QueryFailed`] when an expression matches nothing.
    pub fn postfilter(&self, merged: Value) -> Result<Value, Error> {
        if self.expressions.is_empty() {
            return Ok(merged);
        }
        // Reuse the single-file JSON-path machinery; the first source names
        // the query for error messages.
        let query = Query {
            path: self.sources[0].path.clone(),
            kind: crate::query::QueryKind::JsonPath(self.expressions.clone()),
        };
        match query.apply(&crate::model::EntryContent::Json(merged))? {
            crate::model::EntryContent::Json(value) => Ok(value),
            crate::model::EntryContent::Text(_) => unreachable!("JSON-path yields JSON"),
        }
    }
}

/// Merge `overlay` into `base`: objects merge deeply (right wins per key),
/// everything else is replaced by `overlay`.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn objects_merge_deeply_right_wins() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "keep": true});
        merge_values(&mut base, json!({"a": {"y": 3, "z": 4}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3, "z": 4}, "keep": true}));
    }

    #[test]
    fn arrays_are_replaced_not_concatenated() {
        let mut base = json!({"list": [1, 2, 3]});
        merge_values(&mut base, json!({"list": [9]}));
        assert_eq!(base, json!({"list": [9]}));
    }

    #[test]
    fn scalars_are_replaced() {
        let mut base = json!({"k": "old"});
        merge_values(&mut base, json!({"k": 42}));
        assert_eq!(base, json!({"k": 42}));
    }

    #[test]
    fn type_change_replaces_wholesale() {
        let mut base = json!({"k": {"nested": 1}});
        merge_values(&mut base, json!({"k": [1]}));
        assert_eq!(base, json!({"k": [1]}));
    }

    #[test]
    fn sources_must_be_json() {
        assert!(MergeSource::required("/a.txt").is_err());
        assert!(MergeSource::optional("/a.json").is_ok());
    }

    #[test]
    fn empty_source_list_is_rejected() {
        assert!(MergeQuery::new(vec![]).is_err());
    }

    #[test]
    fn postfilter_applies_json_path() {
        let query = MergeQuery::new(vec![MergeSource::required("/a.json").unwrap()])
            .unwrap()
            .with_expression("$.a");
        assert_eq!(query.postfilter(json!({"a": 7})).unwrap(), json!(7));
    }
}
