//! # Schema Model
//!
//! Tagged-variant trees describing the shape of request parameters and
//! response values.
//!
//! A [`Schema`] is built once at startup and shared read-only across
//! requests. Coercion plans, validation walks, and projection lookups all
//! pattern-match over the same tree, so the variants here are the single
//! source of truth for what a parameter or response may look like.
//!
//! Response schemas can mark object fields as includable (omitted unless
//! the request's `include` parameter names them) and declare `{field}_fields`
//! selectable markers that drive per-request field masking. The query-side
//! counterparts are built with [`Schema::includes`] and [`Schema::selects`].

use serde_json::Value;
use tracing::warn;

/// Primitive leaf kinds for schema terminals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// UTF-8 string, passed through untouched
    String,
    /// Integer or float; query/path strings are coerced via strict decimal parsing
    Number,
    /// Boolean; query/path strings are coerced from exactly `"true"`/`"false"`
    Boolean,
    /// ISO-8601 date or datetime, kept as a string on the wire
    DateTime,
}

impl LeafKind {
    pub(crate) const fn type_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::DateTime => "date",
        }
    }
}

/// A named field of an object schema
///
/// Field order is preserved; validated output objects list fields in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) schema: Schema,
}

impl Field {
    /// Create a field from a name and its schema
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Field name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field schema
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl<S: Into<String>> From<(S, Schema)> for Field {
    fn from((name, schema): (S, Schema)) -> Self {
        Self::new(name, schema)
    }
}

/// Out-of-band tags attached to a schema node via [`Schema::Metadata`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Meta {
    /// Field is omitted from responses unless named in the `include` parameter
    pub includable: bool,
    /// Schema is the `include` query parameter built by [`Schema::includes`]
    pub include_param: bool,
}

impl Meta {
    fn merge(self, other: Self) -> Self {
        Self {
            includable: self.includable || other.includable,
            include_param: self.include_param || other.include_param,
        }
    }
}

/// Declarative shape of a parameter or response value
///
/// Constructed via the builder-style associated functions and chained
/// wrappers:
///
/// ```
/// use trellis::schema::Schema;
///
/// let post = Schema::object([
///     ("id", Schema::number()),
///     ("title", Schema::string()),
///     ("publishedAt", Schema::datetime().optional()),
/// ]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// Primitive terminal
    Leaf(LeafKind),
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
    /// Accepts any JSON value unchanged
    Any,
    /// Ordered set of named fields; unknown keys are stripped during validation
    Object(Vec<Field>),
    /// Homogeneous list
    Array(Box<Schema>),
    /// Value may be absent entirely
    Optional(Box<Schema>),
    /// Value may be JSON `null`
    Nullable(Box<Schema>),
    /// Absent value is replaced by a default before validation
    Default(Box<Schema>, Value),
    /// Arbitrarily nested map of boolean switches; the `select` parameter shape
    Selection,
    /// Marker schema for `{field}_fields` selectable markers in responses
    Selectable,
    /// Wrapper attaching [`Meta`] tags to an inner schema
    Metadata(Box<Schema>, Meta),
}

impl Schema {
    /// String leaf
    #[must_use]
    pub const fn string() -> Self {
        Self::Leaf(LeafKind::String)
    }

    /// Number leaf
    #[must_use]
    pub const fn number() -> Self {
        Self::Leaf(LeafKind::Number)
    }

    /// Boolean leaf
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Leaf(LeafKind::Boolean)
    }

    /// ISO-8601 date or datetime leaf
    #[must_use]
    pub const fn datetime() -> Self {
        Self::Leaf(LeafKind::DateTime)
    }

    /// Accept any JSON value unchanged
    #[must_use]
    pub const fn any() -> Self {
        Self::Any
    }

    /// String restricted to the given values
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Object with the given fields
    pub fn object<I, F>(fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        Self::Object(fields.into_iter().map(Into::into).collect())
    }

    /// Array of the given element schema
    #[must_use]
    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    /// Allow the value to be absent
    #[must_use]
    pub fn optional(self) -> Self {
        Self::Optional(Box::new(self))
    }

    /// Allow the value to be JSON `null`
    #[must_use]
    pub fn nullable(self) -> Self {
        Self::Nullable(Box::new(self))
    }

    /// Substitute a default when the value is absent
    ///
    /// The default is validated against the inner schema as if the caller
    /// had supplied it.
    #[must_use]
    pub fn with_default(self, value: Value) -> Self {
        Self::Default(Box::new(self), value)
    }

    /// Mark a response field as includable
    ///
    /// The field is dropped from responses unless its dotted path is covered
    /// by the request's `include` parameter. The wrapped schema also becomes
    /// optional, so handlers may omit the underlying data even when the
    /// field is included.
    #[must_use]
    pub fn includable(self) -> Self {
        Self::Metadata(
            Box::new(self.optional()),
            Meta {
                includable: true,
                include_param: false,
            },
        )
    }

    /// Marker for a `{field}_fields` selectable field in a response schema
    ///
    /// The marker itself never appears in output. When the request's `select`
    /// parameter carries a sub-tree for the base field, the validated base
    /// value is masked down to the selected keys.
    #[must_use]
    pub const fn selectable() -> Self {
        Self::Selectable
    }

    /// Schema for the `select` query parameter
    ///
    /// Accepts an arbitrarily nested object whose leaves are booleans, keyed
    /// by response field names. Leaves arrive as `"true"`/`"false"` strings
    /// over the wire and go through the regular coercion path.
    #[must_use]
    pub const fn selects() -> Self {
        Self::Selection
    }

    /// Schema for the `include` query parameter, derived from a response schema
    ///
    /// Walks the response schema to the default depth of 3 and admits the
    /// dotted path of every includable field found. See
    /// [`Schema::includes_depth`].
    #[must_use]
    pub fn includes(response: &Self) -> Self {
        Self::includes_depth(response, 3)
    }

    /// Schema for the `include` query parameter with an explicit walk depth
    ///
    /// Produces an array-of-enum schema whose allowed values are the dotted
    /// paths of includable fields, in depth-first encounter order. A response
    /// schema without any includable field yields an empty enum; this is a
    /// configuration warning, not an error.
    #[must_use]
    pub fn includes_depth(response: &Self, max_depth: usize) -> Self {
        let allowed = response.includable_paths(max_depth);
        if allowed.is_empty() {
            warn!("response schema has no includable fields; include parameter admits nothing");
        }
        Self::Metadata(
            Box::new(Self::array(Self::Enum(allowed))),
            Meta {
                includable: false,
                include_param: true,
            },
        )
    }

    /// Dotted paths of every includable field, in depth-first encounter order
    ///
    /// Only fields that unwrap to an object (directly or through an array)
    /// participate; the walk recurses into each such field whether or not it
    /// is itself includable, so nested includable fields are reachable.
    #[must_use]
    pub fn includable_paths(&self, max_depth: usize) -> Vec<String> {
        let mut paths = Vec::new();
        if let Some(fields) = self.unwrap_to_object() {
            collect_includable(fields, "", max_depth, &mut paths);
        }
        paths
    }

    /// Append fields to an object schema, replacing same-named ones
    ///
    /// Metadata, optionality, and other wrappers around the object are
    /// preserved. Non-object schemas are returned unchanged.
    #[must_use]
    pub fn extend<I, F>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        match self {
            Self::Object(mut existing) => {
                for field in fields {
                    let field = field.into();
                    if let Some(slot) = existing.iter_mut().find(|f| f.name == field.name) {
                        *slot = field;
                    } else {
                        existing.push(field);
                    }
                }
                Self::Object(existing)
            }
            Self::Optional(inner) => inner.extend(fields).optional(),
            Self::Nullable(inner) => inner.extend(fields).nullable(),
            Self::Metadata(inner, meta) => Self::Metadata(Box::new(inner.extend(fields)), meta),
            other => other,
        }
    }

    /// Core schema with wrappers peeled, plus the merged metadata tags
    ///
    /// Peels `Optional`, `Nullable`, `Default`, and `Metadata`.
    pub(crate) fn peel(&self) -> (&Self, Meta) {
        let mut current = self;
        let mut meta = Meta::default();
        loop {
            match current {
                Self::Optional(inner) | Self::Nullable(inner) | Self::Default(inner, _) => {
                    current = inner;
                }
                Self::Metadata(inner, tags) => {
                    meta = meta.merge(*tags);
                    current = inner;
                }
                core => return (core, meta),
            }
        }
    }

    /// Object fields reachable through wrappers and arrays, if any
    pub(crate) fn unwrap_to_object(&self) -> Option<&[Field]> {
        match self {
            Self::Object(fields) => Some(fields),
            Self::Optional(inner)
            | Self::Nullable(inner)
            | Self::Default(inner, _)
            | Self::Metadata(inner, _)
            | Self::Array(inner) => inner.unwrap_to_object(),
            _ => None,
        }
    }

    /// Type name used in "Required" and "Expected X" issue messages
    pub(crate) fn expected_name(&self) -> String {
        let (core, _) = self.peel();
        match core {
            Self::Leaf(kind) => kind.type_name().to_string(),
            Self::Enum(values) => join_enum(values),
            Self::Any => "any".to_string(),
            Self::Object(_) | Self::Selection => "object".to_string(),
            Self::Array(_) => "array".to_string(),
            // peel() never returns wrapper variants; Selectable markers are
            // consumed by the object walk before names are ever needed.
            _ => "undefined".to_string(),
        }
    }
}

pub(crate) fn join_enum(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
    quoted.join(" | ")
}

fn collect_includable(fields: &[Field], prefix: &str, depth: usize, out: &mut Vec<String>) {
    for field in fields {
        let Some(inner) = field.schema.unwrap_to_object() else {
            continue;
        };
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };
        let (_, meta) = field.schema.peel();
        if meta.includable {
            out.push(path.clone());
        }
        if depth > 0 {
            collect_includable(inner, &path, depth - 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment() -> Schema {
        Schema::object([
            ("id", Schema::number()),
            ("text", Schema::string()),
        ])
    }

    fn user() -> Schema {
        Schema::object([
            Field::new("name", Schema::string()),
            Field::new("posts", Schema::array(post_bare()).includable()),
        ])
    }

    fn post_bare() -> Schema {
        Schema::object([("id", Schema::number())])
    }

    fn post() -> Schema {
        Schema::object([
            Field::new("id", Schema::number()),
            Field::new("user", user().includable()),
            Field::new("comments", Schema::array(comment()).includable()),
        ])
    }

    #[test]
    fn test_peel_collects_meta() {
        let schema = Schema::string().includable().optional();
        let (core, meta) = schema.peel();
        assert_eq!(core, &Schema::string());
        assert!(meta.includable);
        assert!(!meta.include_param);
    }

    #[test]
    fn test_includable_paths_depth_first() {
        let paths = post().includable_paths(3);
        assert_eq!(paths, vec!["user", "user.posts", "comments"]);
    }

    #[test]
    fn test_includable_paths_idempotent() {
        let schema = post();
        assert_eq!(schema.includable_paths(3), schema.includable_paths(3));
    }

    #[test]
    fn test_includable_paths_depth_limit() {
        let paths = post().includable_paths(0);
        assert_eq!(paths, vec!["user", "comments"]);
    }

    #[test]
    fn test_includable_paths_through_arrays() {
        let page = Schema::object([Field::new("items", Schema::array(post()))]);
        let paths = page.includable_paths(3);
        assert_eq!(paths, vec!["items.user", "items.user.posts", "items.comments"]);
    }

    #[test]
    fn test_includes_builds_enum() {
        let schema = Schema::includes(&post());
        let (core, meta) = schema.peel();
        assert!(meta.include_param);
        let Schema::Array(element) = core else {
            panic!("expected array core, got {core:?}");
        };
        assert_eq!(
            **element,
            Schema::Enum(vec![
                "user".to_string(),
                "user.posts".to_string(),
                "comments".to_string()
            ])
        );
    }

    #[test]
    fn test_includes_empty_is_not_an_error() {
        let schema = Schema::includes(&comment());
        let (core, _) = schema.peel();
        let Schema::Array(element) = core else {
            panic!("expected array core, got {core:?}");
        };
        assert_eq!(**element, Schema::Enum(Vec::new()));
    }

    #[test]
    fn test_extend_replaces_and_appends() {
        let schema = comment().extend([("text", Schema::number()), ("extra", Schema::boolean())]);
        let Schema::Object(fields) = schema else {
            panic!("expected object");
        };
        let names: Vec<&str> = fields.iter().map(Field::name).collect();
        assert_eq!(names, vec!["id", "text", "extra"]);
        assert_eq!(fields[1].schema(), &Schema::number());
    }

    #[test]
    fn test_extend_preserves_wrappers() {
        let schema = comment().optional().extend([("extra", Schema::boolean())]);
        assert!(matches!(schema, Schema::Optional(_)));
    }

    #[test]
    fn test_expected_names() {
        assert_eq!(Schema::string().expected_name(), "string");
        assert_eq!(Schema::number().optional().expected_name(), "number");
        assert_eq!(comment().expected_name(), "object");
        assert_eq!(
            Schema::one_of(["asc", "desc"]).expected_name(),
            "'asc' | 'desc'"
        );
    }
}
