//! # Validation
//!
//! Structural validation of JSON values against a [`Schema`], producing
//! machine-readable [`Issue`]s instead of bailing on the first mismatch.
//!
//! The same walk serves two modes. Request mode checks coerced query, path,
//! and body parameters, prefixing every issue path with a stage marker such
//! as `"<query>"`. Response mode additionally consults a [`Projection`]:
//! includable fields are dropped unless the request asked for them, and
//! selectable fields are masked down to the selected keys.
//!
//! Unknown keys are stripped in both modes; validated output contains
//! declared fields only.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::project::{self, Projection};
use crate::schema::{join_enum, Field, LeafKind, Schema};

/// Machine-readable category of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// Value has the wrong JSON type, or a required value is absent
    InvalidType,
    /// String is not one of the allowed enum values
    InvalidEnumValue,
    /// String is not a parseable ISO-8601 date or datetime
    InvalidDate,
}

/// One segment of an issue path
///
/// Serializes untagged, so a path renders as a mixed array like
/// `["<body>", "items", 1, "id"]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathSeg {
    /// Object key or stage marker
    Key(String),
    /// Array element position
    Index(usize),
}

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// Failure category
    pub code: IssueCode,
    /// Location of the offending value, starting at the stage marker
    pub path: Vec<PathSeg>,
    /// Human-readable description
    pub message: String,
    /// Expected type or value set, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// Received type or value, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
}

impl Issue {
    fn invalid_type(path: Vec<PathSeg>, expected: String, received: &str) -> Self {
        Self {
            code: IssueCode::InvalidType,
            path,
            message: format!("Expected {expected}, received {received}"),
            expected: Some(expected),
            received: Some(received.to_string()),
        }
    }

    fn required(path: Vec<PathSeg>, expected: String) -> Self {
        Self {
            code: IssueCode::InvalidType,
            path,
            message: "Required".to_string(),
            expected: Some(expected),
            received: Some("undefined".to_string()),
        }
    }

    fn invalid_enum(path: Vec<PathSeg>, allowed: &[String], got: &str) -> Self {
        let expected = join_enum(allowed);
        Self {
            code: IssueCode::InvalidEnumValue,
            path,
            message: format!("Invalid enum value. Expected {expected}, received '{got}'"),
            expected: Some(expected),
            received: Some(got.to_string()),
        }
    }

    fn invalid_date(path: Vec<PathSeg>) -> Self {
        Self {
            code: IssueCode::InvalidDate,
            path,
            message: "Invalid date".to_string(),
            expected: None,
            received: None,
        }
    }

    /// Dotted rendering of the path, with `[i]` for array indices
    #[must_use]
    pub fn path_string(&self) -> String {
        let mut out = String::new();
        for seg in &self.path {
            match seg {
                PathSeg::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSeg::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

/// Validate request-stage parameters against a schema
///
/// `stage` becomes the leading path segment of every issue, conventionally
/// `"<query>"`, `"<path>"`, or `"<body>"`. `Ok(None)` means the value was
/// absent and the schema tolerates absence.
pub fn parse_request(
    schema: &Schema,
    value: Option<&Value>,
    stage: &str,
) -> Result<Option<Value>, Vec<Issue>> {
    let mut walker = Walker {
        mode: Mode::Request,
        path: vec![PathSeg::Key(stage.to_string())],
        dotted: Vec::new(),
        issues: Vec::new(),
    };
    let out = walker.walk(schema, value);
    walker.finish(out)
}

/// Validate a handler's response value, applying include/select projections
pub fn parse_response(
    schema: &Schema,
    value: &Value,
    projection: &Projection,
) -> Result<Option<Value>, Vec<Issue>> {
    let mut walker = Walker {
        mode: Mode::Response(projection),
        path: Vec::new(),
        dotted: Vec::new(),
        issues: Vec::new(),
    };
    let out = walker.walk(schema, Some(value));
    walker.finish(out)
}

#[derive(Clone, Copy)]
enum Mode<'a> {
    Request,
    Response(&'a Projection),
}

struct Walker<'a> {
    mode: Mode<'a>,
    path: Vec<PathSeg>,
    /// Dotted location within the response, object keys only. Array indices
    /// are skipped so include/select paths address fields across elements.
    dotted: Vec<String>,
    issues: Vec<Issue>,
}

impl Walker<'_> {
    fn finish(self, out: Option<Value>) -> Result<Option<Value>, Vec<Issue>> {
        if self.issues.is_empty() {
            Ok(out)
        } else {
            Err(self.issues)
        }
    }

    fn walk(&mut self, schema: &Schema, value: Option<&Value>) -> Option<Value> {
        match schema {
            Schema::Metadata(inner, _) => self.walk(inner, value),
            Schema::Optional(inner) => match value {
                None => None,
                some => self.walk(inner, some),
            },
            Schema::Default(inner, default) => match value {
                None => self.walk(inner, Some(default)),
                some => self.walk(inner, some),
            },
            Schema::Nullable(inner) => match value {
                Some(Value::Null) => Some(Value::Null),
                other => self.walk(inner, other),
            },
            Schema::Any => value.cloned(),
            Schema::Leaf(kind) => self.walk_leaf(*kind, value),
            Schema::Enum(allowed) => self.walk_enum(allowed, value),
            Schema::Object(fields) => self.walk_object(fields, value),
            Schema::Array(element) => self.walk_array(element, value),
            Schema::Selection => self.walk_selection(value),
            // Markers are consumed by the enclosing object walk; a marker in
            // any other position contributes nothing.
            Schema::Selectable => None,
        }
    }

    fn walk_leaf(&mut self, kind: LeafKind, value: Option<&Value>) -> Option<Value> {
        let Some(value) = value else {
            self.issues
                .push(Issue::required(self.path.clone(), kind.type_name().to_string()));
            return None;
        };
        let ok = match kind {
            LeafKind::String => value.is_string(),
            LeafKind::Number => value.is_number(),
            LeafKind::Boolean => value.is_boolean(),
            LeafKind::DateTime => return self.walk_datetime(value),
        };
        if ok {
            Some(value.clone())
        } else {
            self.issues.push(Issue::invalid_type(
                self.path.clone(),
                kind.type_name().to_string(),
                type_of(value),
            ));
            None
        }
    }

    fn walk_datetime(&mut self, value: &Value) -> Option<Value> {
        match value.as_str() {
            Some(s) if is_iso_datetime(s) => Some(value.clone()),
            Some(_) => {
                self.issues.push(Issue::invalid_date(self.path.clone()));
                None
            }
            None => {
                self.issues.push(Issue::invalid_type(
                    self.path.clone(),
                    "date".to_string(),
                    type_of(value),
                ));
                None
            }
        }
    }

    fn walk_enum(&mut self, allowed: &[String], value: Option<&Value>) -> Option<Value> {
        let Some(value) = value else {
            self.issues
                .push(Issue::required(self.path.clone(), join_enum(allowed)));
            return None;
        };
        match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => Some(value.clone()),
            Some(s) => {
                self.issues
                    .push(Issue::invalid_enum(self.path.clone(), allowed, s));
                None
            }
            None => {
                self.issues.push(Issue::invalid_type(
                    self.path.clone(),
                    join_enum(allowed),
                    type_of(value),
                ));
                None
            }
        }
    }

    fn walk_array(&mut self, element: &Schema, value: Option<&Value>) -> Option<Value> {
        let Some(value) = value else {
            self.issues
                .push(Issue::required(self.path.clone(), "array".to_string()));
            return None;
        };
        let Some(items) = value.as_array() else {
            self.issues.push(Issue::invalid_type(
                self.path.clone(),
                "array".to_string(),
                type_of(value),
            ));
            return None;
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            self.path.push(PathSeg::Index(i));
            let parsed = self.walk(element, Some(item));
            self.path.pop();
            if let Some(v) = parsed {
                out.push(v);
            }
        }
        Some(Value::Array(out))
    }

    fn walk_selection(&mut self, value: Option<&Value>) -> Option<Value> {
        let Some(value) = value else {
            self.issues
                .push(Issue::required(self.path.clone(), "object".to_string()));
            return None;
        };
        let Some(map) = value.as_object() else {
            self.issues.push(Issue::invalid_type(
                self.path.clone(),
                "object".to_string(),
                type_of(value),
            ));
            return None;
        };
        let mut out = Map::new();
        for (key, entry) in map {
            self.path.push(PathSeg::Key(key.clone()));
            match entry {
                Value::Bool(_) => {
                    out.insert(key.clone(), entry.clone());
                }
                Value::Object(_) => {
                    if let Some(v) = self.walk_selection(Some(entry)) {
                        out.insert(key.clone(), v);
                    }
                }
                other => {
                    self.issues.push(Issue::invalid_type(
                        self.path.clone(),
                        "boolean".to_string(),
                        type_of(other),
                    ));
                }
            }
            self.path.pop();
        }
        Some(Value::Object(out))
    }

    fn walk_object(&mut self, fields: &[Field], value: Option<&Value>) -> Option<Value> {
        let Some(value) = value else {
            self.issues
                .push(Issue::required(self.path.clone(), "object".to_string()));
            return None;
        };
        let Some(map) = value.as_object() else {
            self.issues.push(Issue::invalid_type(
                self.path.clone(),
                "object".to_string(),
                type_of(value),
            ));
            return None;
        };
        let mut out = Map::new();
        // Masks are applied after the field loop so a marker declared before
        // its base field still takes effect.
        let mut masks: Vec<(String, Map<String, Value>)> = Vec::new();
        for field in fields {
            let (core, meta) = field.schema.peel();
            if matches!(core, Schema::Selectable) {
                if let Mode::Response(projection) = self.mode {
                    if let Some(base) = field.name.strip_suffix("_fields") {
                        self.dotted.push(base.to_string());
                        if let Some(node) = projection.selection_at(&self.dotted) {
                            masks.push((base.to_string(), node.clone()));
                        }
                        self.dotted.pop();
                    }
                }
                continue;
            }
            if meta.includable {
                if let Mode::Response(projection) = self.mode {
                    self.dotted.push(field.name.clone());
                    let included = projection.is_included(&self.dotted.join("."));
                    self.dotted.pop();
                    if !included {
                        continue;
                    }
                }
            }
            self.path.push(PathSeg::Key(field.name.clone()));
            self.dotted.push(field.name.clone());
            let parsed = self.walk(&field.schema, map.get(&field.name));
            self.dotted.pop();
            self.path.pop();
            if let Some(v) = parsed {
                out.insert(field.name.clone(), v);
            }
        }
        for (base, node) in masks {
            if let Some(current) = out.remove(&base) {
                out.insert(base, project::apply_mask(current, &node));
            }
        }
        Some(Value::Object(out))
    }
}

fn is_iso_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body_schema() -> Schema {
        Schema::object([
            ("title", Schema::string()),
            ("content", Schema::string()),
        ])
    }

    #[test]
    fn test_required_top_level() {
        let issues = parse_request(&body_schema(), None, "<body>").unwrap_err();
        assert_eq!(
            serde_json::to_value(&issues).unwrap(),
            json!([{
                "code": "invalid_type",
                "path": ["<body>"],
                "message": "Required",
                "expected": "object",
                "received": "undefined"
            }])
        );
    }

    #[test]
    fn test_required_nested_field() {
        let value = json!({ "title": "hi" });
        let issues = parse_request(&body_schema(), Some(&value), "<body>").unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            serde_json::to_value(&issues[0]).unwrap(),
            json!({
                "code": "invalid_type",
                "path": ["<body>", "content"],
                "message": "Required",
                "expected": "string",
                "received": "undefined"
            })
        );
    }

    #[test]
    fn test_wrong_type_message() {
        let schema = Schema::object([("bar", Schema::number())]);
        let value = json!({ "bar": "abc" });
        let issues = parse_request(&schema, Some(&value), "<query>").unwrap_err();
        assert_eq!(issues[0].message, "Expected number, received string");
        assert_eq!(issues[0].path_string(), "<query>.bar");
    }

    #[test]
    fn test_unknown_keys_stripped() {
        let value = json!({ "title": "a", "content": "b", "sneaky": true });
        let parsed = parse_request(&body_schema(), Some(&value), "<body>")
            .unwrap()
            .unwrap();
        assert_eq!(parsed, json!({ "title": "a", "content": "b" }));
    }

    #[test]
    fn test_optional_and_nullable() {
        let schema = Schema::object([
            ("a", Schema::string().optional()),
            ("b", Schema::string().nullable()),
        ]);
        let value = json!({ "b": null });
        let parsed = parse_request(&schema, Some(&value), "<body>")
            .unwrap()
            .unwrap();
        assert_eq!(parsed, json!({ "b": null }));
    }

    #[test]
    fn test_default_applied_when_absent() {
        let schema = Schema::object([("pageSize", Schema::number().with_default(json!(20)))]);
        let parsed = parse_request(&schema, Some(&json!({})), "<query>")
            .unwrap()
            .unwrap();
        assert_eq!(parsed, json!({ "pageSize": 20 }));
    }

    #[test]
    fn test_enum_rejects_unknown_value() {
        let schema = Schema::object([("sortDirection", Schema::one_of(["asc", "desc"]))]);
        let value = json!({ "sortDirection": "sideways" });
        let issues = parse_request(&schema, Some(&value), "<query>").unwrap_err();
        assert_eq!(issues[0].code, IssueCode::InvalidEnumValue);
        assert_eq!(
            issues[0].message,
            "Invalid enum value. Expected 'asc' | 'desc', received 'sideways'"
        );
    }

    #[test]
    fn test_datetime_accepts_iso_forms() {
        let schema = Schema::object([("at", Schema::datetime())]);
        for ok in ["2024-01-02T03:04:05Z", "2024-01-02T03:04:05+02:00", "2024-01-02"] {
            let value = json!({ "at": ok });
            let parsed = parse_request(&schema, Some(&value), "<query>")
                .unwrap()
                .unwrap();
            assert_eq!(parsed, value, "expected {ok} to validate");
        }
    }

    #[test]
    fn test_datetime_rejects_garbage() {
        let schema = Schema::object([("at", Schema::datetime())]);
        let value = json!({ "at": "not a date" });
        let issues = parse_request(&schema, Some(&value), "<query>").unwrap_err();
        assert_eq!(issues[0].code, IssueCode::InvalidDate);
        assert_eq!(issues[0].message, "Invalid date");
    }

    #[test]
    fn test_array_index_in_path() {
        let schema = Schema::object([("items", Schema::array(Schema::number()))]);
        let value = json!({ "items": [1, "two", 3] });
        let issues = parse_request(&schema, Some(&value), "<body>").unwrap_err();
        assert_eq!(issues[0].path_string(), "<body>.items[1]");
        assert_eq!(
            serde_json::to_value(&issues[0].path).unwrap(),
            json!(["<body>", "items", 1])
        );
    }

    #[test]
    fn test_selection_validates_boolean_leaves() {
        let schema = Schema::selects();
        let value = json!({ "comments": { "id": "yes" } });
        let issues = parse_request(&schema, Some(&value), "<query>").unwrap_err();
        assert_eq!(issues[0].path_string(), "<query>.comments.id");
        assert_eq!(issues[0].message, "Expected boolean, received string");
    }

    fn post_response() -> Schema {
        Schema::object([
            Field::new("id", Schema::number()),
            Field::new("user", Schema::object([("name", Schema::string())]).includable()),
            Field::new(
                "comments",
                Schema::array(Schema::object([
                    ("id", Schema::number()),
                    ("text", Schema::string()),
                ]))
                .includable(),
            ),
            Field::new("comments_fields", Schema::selectable()),
        ])
    }

    fn full_post() -> Value {
        json!({
            "id": 1,
            "user": { "name": "ada" },
            "comments": [
                { "id": 10, "text": "first" },
                { "id": 11, "text": "second" }
            ]
        })
    }

    #[test]
    fn test_response_omits_unincluded_fields() {
        let projection = Projection::default();
        let out = parse_response(&post_response(), &full_post(), &projection)
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({ "id": 1 }));
    }

    #[test]
    fn test_response_keeps_included_fields() {
        let projection = Projection::new(vec!["user".to_string()], None);
        let out = parse_response(&post_response(), &full_post(), &projection)
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({ "id": 1, "user": { "name": "ada" } }));
    }

    #[test]
    fn test_response_selection_masks_elements() {
        let projection = Projection::new(
            vec!["comments".to_string()],
            Some(json!({ "comments": { "id": true } })),
        );
        let out = parse_response(&post_response(), &full_post(), &projection)
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            json!({ "id": 1, "comments": [{ "id": 10 }, { "id": 11 }] })
        );
    }

    #[test]
    fn test_response_selection_boolean_is_passthrough() {
        let projection = Projection::new(
            vec!["comments".to_string()],
            Some(json!({ "comments": true })),
        );
        let out = parse_response(&post_response(), &full_post(), &projection)
            .unwrap()
            .unwrap();
        assert_eq!(out["comments"], full_post()["comments"]);
    }

    #[test]
    fn test_response_violation_reports_issue() {
        let schema = Schema::object([("id", Schema::number())]);
        let issues = parse_response(&schema, &json!({ "id": "oops" }), &Projection::default())
            .unwrap_err();
        assert_eq!(issues[0].path_string(), "id");
        assert_eq!(issues[0].code, IssueCode::InvalidType);
    }
}
