//! Flatten OPS response documents into [`SearchRecord`](crate::models::SearchRecord)s
//! and [`BiblioRecord`](crate::models::BiblioRecord)s.
//!
//! OPS encodes repeated elements as a JSON array but a single element as a
//! bare object. Every nesting level goes through [`one_or_many`] before it
//! is iterated, so both shapes flatten identically.
//!
//! A not-found response yields `Ok(None)`. A response without the expected
//! envelope is a [`MalformedResponse`](crate::ops::OpsError::MalformedResponse);
//! a single document missing a required key is skipped with a warning.

mod biblio;
mod search;

pub use biblio::{extract_biblio, extract_biblio_envelopes, extract_biblio_json};
pub use search::extract_search;

use serde_json::Value;

use crate::ops::OpsError;

/// Top-level key of every OPS JSON document
pub const WORLD_PATENT_DATA: &str = "ops:world-patent-data";
/// Container of search results below [`WORLD_PATENT_DATA`]
pub const BIBLIO_SEARCH: &str = "ops:biblio-search";
/// Result list below [`BIBLIO_SEARCH`]
pub const SEARCH_RESULT: &str = "ops:search-result";

/// View a value as a sequence: arrays as-is, `null` as empty, anything
/// else as a single element.
pub fn one_or_many(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Follow `path` through nested objects.
pub(crate) fn at<'a>(value: &'a Value, path: &[&str]) -> Result<&'a Value, OpsError> {
    path.iter().try_fold(value, |current, key| {
        current
            .get(key)
            .ok_or_else(|| OpsError::MalformedResponse(format!("missing key '{}'", path.join("/"))))
    })
}

/// Text content of a scalar value
pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Text at `path`
pub(crate) fn text_at(value: &Value, path: &[&str]) -> Result<String, OpsError> {
    text(at(value, path)?).ok_or_else(|| {
        OpsError::MalformedResponse(format!("'{}' is not a scalar", path.join("/")))
    })
}

/// Text of the `$` member at `path` (`{"$": "..."}` is how OPS encodes text nodes)
pub(crate) fn dollar_at(value: &Value, path: &[&str]) -> Result<String, OpsError> {
    let node = at(value, path)?;
    text(at(node, &["$"]).map_err(|_| {
        OpsError::MalformedResponse(format!("missing key '{}/$'", path.join("/")))
    })?)
    .ok_or_else(|| OpsError::MalformedResponse(format!("'{}/$' is not a scalar", path.join("/"))))
}

/// `@total-result-count` of a search or biblio-search document
pub fn total_result_count(json: &Value) -> Result<u64, OpsError> {
    let raw = text_at(json, &[WORLD_PATENT_DATA, BIBLIO_SEARCH, "@total-result-count"])?;
    raw.trim().parse().map_err(|_| {
        OpsError::MalformedResponse(format!("@total-result-count '{}' is not a number", raw))
    })
}
