//! # Projection
//!
//! Per-request shaping of response values through the `include` and `select`
//! query parameters.
//!
//! The include list is a flat set of dotted paths naming the includable
//! response fields the caller wants. The select tree is a nested map of
//! boolean switches masking a selectable field down to a subset of its keys.
//! Both are extracted from the validated query and applied during response
//! validation, never mutated afterwards.

use serde_json::{Map, Value};

use crate::schema::Schema;

/// Parsed include/select state for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    include: Vec<String>,
    select: Option<Value>,
}

impl Projection {
    /// Build a projection from explicit parts
    #[must_use]
    pub const fn new(include: Vec<String>, select: Option<Value>) -> Self {
        Self { include, select }
    }

    /// Extract the projection from validated query parameters
    ///
    /// Scans the query schema for the parameter built with
    /// [`Schema::includes`] and the one built with [`Schema::selects`], then
    /// reads their validated values. Either may be absent; an absent include
    /// list keeps every includable field hidden.
    pub(crate) fn from_query(query_schema: Option<&Schema>, query: Option<&Value>) -> Self {
        let (Some(schema), Some(Value::Object(map))) = (query_schema, query) else {
            return Self::default();
        };
        let Some(fields) = schema.unwrap_to_object() else {
            return Self::default();
        };
        let mut projection = Self::default();
        for field in fields {
            let (core, meta) = field.schema().peel();
            if meta.include_param {
                if let Some(Value::Array(items)) = map.get(field.name()) {
                    projection.include = items
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect();
                }
            } else if matches!(core, Schema::Selection) {
                if let Some(tree) = map.get(field.name()) {
                    if tree.is_object() {
                        projection.select = Some(tree.clone());
                    }
                }
            }
        }
        projection
    }

    /// Whether a dotted response path is covered by the include list
    ///
    /// An entry covers the path when it names it exactly or names something
    /// beneath it, so including `"user.posts"` also exposes `"user"`. The
    /// reverse does not hold: including `"user"` says nothing about
    /// `"user.posts"`.
    #[must_use]
    pub fn is_included(&self, path: &str) -> bool {
        self.include.iter().any(|entry| {
            entry.as_str() == path
                || entry
                    .strip_prefix(path)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    /// Include entries as parsed from the request
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Raw select tree as parsed from the request
    #[must_use]
    pub fn select(&self) -> Option<&Value> {
        self.select.as_ref()
    }

    /// Include entries beneath `prefix`, with the prefix stripped
    ///
    /// Handlers forward these to whatever loads the related records: with
    /// include `["user", "user.posts"]`, `sub_paths("user")` is `["posts"]`.
    #[must_use]
    pub fn sub_paths(&self, prefix: &str) -> Vec<String> {
        self.include
            .iter()
            .filter_map(|entry| {
                entry
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .map(String::from)
            })
            .collect()
    }

    /// Select sub-tree at a dotted location, when it has explicit children
    ///
    /// A boolean or missing entry yields `None`, which leaves the field
    /// unmasked.
    pub(crate) fn selection_at(&self, segs: &[String]) -> Option<&Map<String, Value>> {
        let mut node = self.select.as_ref()?.as_object()?;
        for seg in segs {
            node = node.get(seg)?.as_object()?;
        }
        Some(node)
    }
}

/// Mask a validated value down to the selected keys
///
/// Arrays are masked per element. Objects keep the keys whose selection entry
/// is truthy, either `true` or a nested tree. Scalars pass through untouched.
pub(crate) fn apply_mask(value: Value, node: &Map<String, Value>) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| apply_mask(item, node))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| node.get(key).is_some_and(truthy))
                .collect(),
        ),
        other => other,
    }
}

fn truthy(value: &Value) -> bool {
    matches!(value, Value::Bool(true) | Value::Object(_))
}
