//! Queries over single entries.
//!
//! An identity query returns an entry's content as-is; a JSON-path query
//! evaluates one or more expressions against a JSON entry, feeding each
//! expression the result of the previous one. Merge queries live in
//! [`merge`].

mod merge;

pub use merge::{MergeQuery, MergeSource, merge_values};

use serde_json::Value;

use crate::error::Error;
use crate::model::{Entry, EntryContent};
use crate::path::FilePath;

/// A query on a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// The file the query targets.
    pub path: FilePath,
    /// How to transform the content.
    pub kind: QueryKind,
}

/// The kind of a [`Query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryKind {
    /// The content as-is, whatever its type.
    Identity,
    /// The content as text.
    IdentityText,
    /// The content as JSON; non-JSON entries fail.
    IdentityJson,
    /// One or more JSON-path expressions applied in sequence.
    JsonPath(Vec<String>),
}

impl Query {
    /// An identity query.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid path.
    pub fn identity(path: &str) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            kind: QueryKind::Identity,
        })
    }

    /// An identity query that renders the content as text.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid path.
    pub fn of_text(path: &str) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            kind: QueryKind::IdentityText,
        })
    }

    /// An identity query that requires JSON content.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid path.
    pub fn of_json(path: &str) -> Result<Self, Error> {
        Ok(Self {
            path: FilePath::new(path)?,
            kind: QueryKind::IdentityJson,
        })
    }

    /// A JSON-path query. The path must name a JSON file.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an invalid or non-`.json` path, or an
    /// empty expression list.
    pub fn of_json_path(
        path: &str,
        expressions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, Error> {
        let path = FilePath::new(path)?;
        if !path.is_json() {
            return Err(Error::invalid(format!(
                "JSON-path query requires a .json path: {path}"
            )));
        }
        let expressions: Vec<String> = expressions.into_iter().map(Into::into).collect();
        if expressions.is_empty() {
            return Err(Error::invalid(
                "JSON-path query requires at least one expression",
            ));
        }
        Ok(Self {
            path,
            kind: QueryKind::JsonPath(expressions),
        })
    }

    /// Evaluate this query against an entry's content.
    ///
    /// # Errors
    /// [`Error::QueryFailed`] when the content type does not fit the query
    /// or an expression matches nothing.
    pub fn apply(&self, content: &EntryContent) -> Result<EntryContent, Error> {
        match &self.kind {
            QueryKind::Identity => Ok(content.clone()),
            QueryKind::IdentityText => match content {
                EntryContent::Text(text) => Ok(EntryContent::Text(text.clone())),
                EntryContent::Json(value) => {
                    Ok(EntryContent::Text(render_json_text(value)))
                }
            },
            QueryKind::IdentityJson => match content {
                EntryContent::Json(value) => Ok(EntryContent::Json(value.clone())),
                EntryContent::Text(_) => Err(self.fail("entry is not JSON")),
            },
            QueryKind::JsonPath(expressions) => {
                let EntryContent::Json(value) = content else {
                    return Err(self.fail("JSON-path query on a non-JSON entry"));
                };
                let mut current = value.clone();
                for expression in expressions {
                    current = self.eval_expression(&current, expression)?;
                }
                Ok(EntryContent::Json(current))
            }
        }
    }

    /// Evaluate this query against an already-loaded [`Entry`], producing a
    /// new entry carrying the queried content.
    ///
    /// # Errors
    /// [`Error::QueryFailed`] as for [`Query::apply`]; directories and
    /// unfetched entries cannot be queried.
    pub fn apply_to_entry(&self, entry: &Entry) -> Result<Entry, Error> {
        let Some(content) = &entry.content else {
            return Err(self.fail("entry has no content"));
        };
        let queried = self.apply(content)?;
        let kind = match &queried {
            EntryContent::Json(_) => crate::model::EntryType::Json,
            EntryContent::Text(_) => crate::model::EntryType::Text,
        };
        Ok(Entry {
            path: entry.path.clone(),
            kind,
            content: Some(queried),
        })
    }

    fn eval_expression(&self, value: &Value, expression: &str) -> Result<Value, Error> {
        let path = serde_json_path::JsonPath::parse(expression)
            .map_err(|e| Error::invalid(format!("malformed JSON path {expression:?}: {e}")))?;
        let nodes = path.query(value).all();
        match nodes.len() {
            0 => Err(self.fail(format!("JSON path {expression:?} matched nothing"))),
            1 => Ok(nodes[0].clone()),
            _ => Ok(Value::Array(nodes.into_iter().cloned().collect())),
        }
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::QueryFailed {
            path: self.path.to_string(),
            message: message.into(),
        }
    }
}

/// Render a JSON value the way it is stored in a text view.
///
/// # Panics
/// Never — JSON values always serialize.
#[must_use]
pub fn render_json_text(value: &Value) -> String {
    #[allow(clippy::unwrap_used)]
    let mut text = serde_json::to_string(value).unwrap();
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identity_passes_content_through() {
        let q = Query::identity("/a.json").unwrap();
        let content = EntryContent::Json(json!({"k": 1}));
        assert_eq!(q.apply(&content).unwrap(), content);
    }

    #[test]
    fn identity_json_rejects_text() {
        let q = Query::of_json("/a.txt").unwrap();
        let content = EntryContent::Text("hello\n".to_owned());
        assert!(matches!(
            q.apply(&content),
            Err(Error::QueryFailed { .. })
        ));
    }

    #[test]
    fn json_path_extracts_a_value() {
        let q = Query::of_json_path("/a.json", ["$.a.b"]).unwrap();
        let content = EntryContent::Json(json!({"a": {"b": 42}}));
        assert_eq!(q.apply(&content).unwrap(), EntryContent::Json(json!(42)));
    }

    #[test]
    fn json_path_expressions_chain() {
        let q = Query::of_json_path("/a.json", ["$.a", "$.b"]).unwrap();
        let content = EntryContent::Json(json!({"a": {"b": "deep"}}));
        assert_eq!(
            q.apply(&content).unwrap(),
            EntryContent::Json(json!("deep"))
        );
    }

    #[test]
    fn json_path_multiple_matches_become_an_array() {
        let q = Query::of_json_path("/a.json", ["$.items[*].id"]).unwrap();
        let content = EntryContent::Json(json!({"items": [{"id": 1}, {"id": 2}]}));
        assert_eq!(
            q.apply(&content).unwrap(),
            EntryContent::Json(json!([1, 2]))
        );
    }

    #[test]
    fn json_path_no_match_fails() {
        let q = Query::of_json_path("/a.json", ["$.missing"]).unwrap();
        let content = EntryContent::Json(json!({"k": 1}));
        assert!(matches!(q.apply(&content), Err(Error::QueryFailed { .. })));
    }

    #[test]
    fn json_path_requires_json_file() {
        assert!(Query::of_json_path("/a.txt", ["$.a"]).is_err());
    }
}
