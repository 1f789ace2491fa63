//! # Endpoints
//!
//! Endpoint declarations and everything attached to them: the parsed
//! `"METHOD /path"` template, parameter and response schemas, the handler,
//! and per-endpoint caches for resolved schemas and coercion plans.
//!
//! Schemas are attached inline through the builder or resolved lazily
//! through a [`SchemaSource`] for endpoints built with
//! [`EndpointBuilder::deferred_schemas`]. Both paths land in the same cache,
//! so the executor never distinguishes between them after first use.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use crate::coerce::CoercePlan;
use crate::context::RequestContext;
use crate::error::{ApiError, ApiResult, ConfigError};
use crate::middleware::BoxFuture;
use crate::schema::Schema;

/// HTTP methods the framework routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
    /// HEAD
    Head,
}

impl Method {
    /// Every supported method, in canonical order
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
        Self::Head,
    ];

    /// Canonical uppercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }

    /// Parse a canonical method name; matching is case-sensitive
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One segment of a parsed path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Fixed text matched exactly
    Literal(String),
    /// `{name}` capture matching exactly one path segment
    Param(String),
}

/// Parsed route path with `{name}` captures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<PathSegment>,
}

impl PathTemplate {
    /// Parse a template like `/posts/{postId}/comments`
    ///
    /// The path must start with `/`. A parameter must span a whole segment;
    /// partial captures like `/posts/v{n}` are rejected, as are duplicate
    /// parameter names. Empty segments collapse, so `/posts//5` and
    /// `/posts/5` describe the same route.
    pub fn parse(endpoint: &str, path: &str) -> Result<Self, ConfigError> {
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "path must start with '/'".to_string(),
            });
        }
        let mut segments = Vec::new();
        let mut seen = Vec::new();
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(ConfigError::InvalidPathParameter {
                        endpoint: endpoint.to_string(),
                        segment: seg.to_string(),
                    });
                }
                if seen.contains(&name) {
                    return Err(ConfigError::InvalidPathParameter {
                        endpoint: endpoint.to_string(),
                        segment: seg.to_string(),
                    });
                }
                seen.push(name);
                segments.push(PathSegment::Param(name.to_string()));
            } else if seg.contains(['{', '}']) {
                return Err(ConfigError::InvalidPathParameter {
                    endpoint: endpoint.to_string(),
                    segment: seg.to_string(),
                });
            } else {
                segments.push(PathSegment::Literal(seg.to_string()));
            }
        }
        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    /// Template as written in the declaration
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Parsed segments
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Names of the `{name}` captures, in order
    #[must_use]
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|seg| match seg {
                PathSegment::Param(name) => Some(name.as_str()),
                PathSegment::Literal(_) => None,
            })
            .collect()
    }

    /// Match decoded path segments, capturing parameter values as strings
    #[must_use]
    pub fn match_segments(&self, segments: &[String]) -> Option<Map<String, Value>> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut params = Map::new();
        for (tpl, got) in self.segments.iter().zip(segments) {
            match tpl {
                PathSegment::Literal(lit) => {
                    if lit != got {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), Value::String(got.clone()));
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse an endpoint declaration like `"GET /posts/{postId}"`
///
/// A declaration is a canonical method name, a single space, and a path
/// template.
pub fn parse_endpoint(endpoint: &str) -> Result<(Method, PathTemplate), ConfigError> {
    let Some((method_str, path)) = endpoint.split_once(' ') else {
        return Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "expected \"METHOD /path\"".to_string(),
        });
    };
    let Some(method) = Method::parse(method_str) else {
        return Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unknown method '{method_str}'"),
        });
    };
    let template = PathTemplate::parse(endpoint, path)?;
    Ok((method, template))
}

/// Schema bundle for one endpoint
///
/// Any subset may be present. Path, query, and body schemas must be objects
/// at their core; the response schema is unconstrained.
#[derive(Debug, Clone, Default)]
pub struct EndpointSchemas {
    /// Path parameter schema
    pub path: Option<Schema>,
    /// Query parameter schema
    pub query: Option<Schema>,
    /// Body schema
    pub body: Option<Schema>,
    /// Response schema; absent means the endpoint returns no body
    pub response: Option<Schema>,
}

impl EndpointSchemas {
    fn validate(&self, endpoint: &str) -> Result<(), ConfigError> {
        for (stage, schema) in [
            ("path", &self.path),
            ("query", &self.query),
            ("body", &self.body),
        ] {
            if let Some(schema) = schema {
                let (core, _) = schema.peel();
                if !matches!(core, Schema::Object(_)) {
                    return Err(ConfigError::InvalidEndpoint {
                        endpoint: endpoint.to_string(),
                        reason: format!("{stage} schema must be an object"),
                    });
                }
            }
        }
        if let Some(response) = &self.response {
            check_markers(endpoint, response)?;
        }
        Ok(())
    }
}

/// Selectable markers must be named `{base}_fields` with the base field
/// declared alongside them.
fn check_markers(endpoint: &str, schema: &Schema) -> Result<(), ConfigError> {
    match schema {
        Schema::Object(fields) => {
            for field in fields {
                let (core, _) = field.schema().peel();
                if matches!(core, Schema::Selectable) {
                    let base = field.name().strip_suffix("_fields").ok_or_else(|| {
                        ConfigError::InvalidEndpoint {
                            endpoint: endpoint.to_string(),
                            reason: format!(
                                "selectable marker '{}' must be named '<base>_fields'",
                                field.name()
                            ),
                        }
                    })?;
                    if !fields.iter().any(|f| f.name() == base) {
                        return Err(ConfigError::InvalidEndpoint {
                            endpoint: endpoint.to_string(),
                            reason: format!(
                                "selectable marker '{}' has no sibling field '{base}'",
                                field.name()
                            ),
                        });
                    }
                }
                check_markers(endpoint, field.schema())?;
            }
            Ok(())
        }
        Schema::Array(inner)
        | Schema::Optional(inner)
        | Schema::Nullable(inner)
        | Schema::Default(inner, _)
        | Schema::Metadata(inner, _) => check_markers(endpoint, inner),
        _ => Ok(()),
    }
}

/// Deferred schema supplier for endpoints built without inline schemas
///
/// Keyed by the endpoint declaration string. An API configured with a source
/// resolves deferred endpoints on first use and caches the result on the
/// endpoint.
pub trait SchemaSource: Send + Sync {
    /// Schemas for the given endpoint declaration, if known
    fn load(&self, endpoint: &str) -> Option<EndpointSchemas>;
}

/// Handler output: the raw response value, validated afterwards
pub type HandlerResult = ApiResult<Value>;

/// Boxed handler invoked with the merged parameter object and the context
pub type Handler =
    Arc<dyn Fn(Value, RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`Handler`]
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |params, ctx| Box::pin(f(params, ctx)))
}

/// A single routable operation
pub struct Endpoint {
    endpoint: String,
    method: Method,
    template: PathTemplate,
    summary: Option<String>,
    description: Option<String>,
    config: Map<String, Value>,
    handler: Option<Handler>,
    deferred: bool,
    schemas: OnceLock<Arc<EndpointSchemas>>,
    query_plan: OnceLock<Arc<CoercePlan>>,
    path_plan: OnceLock<Arc<CoercePlan>>,
}

impl Endpoint {
    /// Start building an endpoint from its declaration string
    pub fn builder(endpoint: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(endpoint)
    }

    /// Declaration string, for example `"GET /posts/{postId}"`
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Parsed path template
    #[must_use]
    pub const fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Short human-readable summary, if set
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Longer description, if set
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Free-form configuration read by plugins
    #[must_use]
    pub const fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Attached handler, if any
    #[must_use]
    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    /// Whether schemas are resolved through a [`SchemaSource`]
    #[must_use]
    pub const fn is_deferred(&self) -> bool {
        self.deferred
    }

    /// Resolved schema bundle, loading deferred schemas through the source
    ///
    /// Inline endpoints always resolve; an endpoint built without schemas
    /// yields an empty bundle. A deferred endpoint with no source, or one the
    /// source does not know, is a configuration fault surfaced as an internal
    /// error. Concurrent first uses may both load; one result wins the cache.
    pub(crate) fn resolve_schemas(
        &self,
        source: Option<&dyn SchemaSource>,
    ) -> ApiResult<Arc<EndpointSchemas>> {
        if let Some(schemas) = self.schemas.get() {
            return Ok(Arc::clone(schemas));
        }
        let Some(source) = source else {
            return Err(ApiError::internal(format!(
                "no schema source configured for deferred endpoint {}",
                self.endpoint
            )));
        };
        let Some(loaded) = source.load(&self.endpoint) else {
            return Err(ApiError::internal(format!(
                "schema source has no entry for endpoint {}",
                self.endpoint
            )));
        };
        loaded
            .validate(&self.endpoint)
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(Arc::clone(self.schemas.get_or_init(|| Arc::new(loaded))))
    }

    /// Cached coercion plan for the query schema
    pub(crate) fn query_plan(&self, schemas: &EndpointSchemas) -> Option<Arc<CoercePlan>> {
        schemas.query.as_ref().map(|schema| {
            Arc::clone(
                self.query_plan
                    .get_or_init(|| Arc::new(CoercePlan::from_schema(schema))),
            )
        })
    }

    /// Cached coercion plan for the path schema
    pub(crate) fn path_plan(&self, schemas: &EndpointSchemas) -> Option<Arc<CoercePlan>> {
        schemas.path.as_ref().map(|schema| {
            Arc::clone(
                self.path_plan
                    .get_or_init(|| Arc::new(CoercePlan::from_schema(schema))),
            )
        })
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("endpoint", &self.endpoint)
            .field("deferred", &self.deferred)
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Endpoint`]
pub struct EndpointBuilder {
    endpoint: String,
    summary: Option<String>,
    description: Option<String>,
    config: Map<String, Value>,
    schemas: EndpointSchemas,
    has_inline_schemas: bool,
    deferred: bool,
    handler: Option<Handler>,
}

impl EndpointBuilder {
    fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            summary: None,
            description: None,
            config: Map::new(),
            schemas: EndpointSchemas::default(),
            has_inline_schemas: false,
            deferred: false,
            handler: None,
        }
    }

    /// Short human-readable summary
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Longer description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a free-form configuration entry read by plugins
    #[must_use]
    pub fn config_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Inline path parameter schema
    #[must_use]
    pub fn path_schema(mut self, schema: Schema) -> Self {
        self.schemas.path = Some(schema);
        self.has_inline_schemas = true;
        self
    }

    /// Inline query parameter schema
    #[must_use]
    pub fn query_schema(mut self, schema: Schema) -> Self {
        self.schemas.query = Some(schema);
        self.has_inline_schemas = true;
        self
    }

    /// Inline body schema
    #[must_use]
    pub fn body_schema(mut self, schema: Schema) -> Self {
        self.schemas.body = Some(schema);
        self.has_inline_schemas = true;
        self
    }

    /// Inline response schema
    #[must_use]
    pub fn response_schema(mut self, schema: Schema) -> Self {
        self.schemas.response = Some(schema);
        self.has_inline_schemas = true;
        self
    }

    /// Resolve schemas through the API's [`SchemaSource`] on first use
    #[must_use]
    pub fn deferred_schemas(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Attach a prebuilt handler
    #[must_use]
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach an async closure as the handler
    #[must_use]
    pub fn handler_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handler(handler_fn(f))
    }

    /// Validate the declaration and schemas and build the endpoint
    pub fn build(self) -> Result<Endpoint, ConfigError> {
        let (method, template) = parse_endpoint(&self.endpoint)?;
        if self.deferred && self.has_inline_schemas {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint,
                reason: "deferred endpoint cannot carry inline schemas".to_string(),
            });
        }
        self.schemas.validate(&self.endpoint)?;
        let schemas = OnceLock::new();
        if !self.deferred {
            let _ = schemas.set(Arc::new(self.schemas));
        }
        Ok(Endpoint {
            endpoint: self.endpoint,
            method,
            template,
            summary: self.summary,
            description: self.description,
            config: self.config,
            handler: self.handler,
            deferred: self.deferred,
            schemas,
            query_plan: OnceLock::new(),
            path_plan: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_method_parse_is_case_sensitive() {
        assert_eq!(Method::parse("GET"), Some(Method::Get));
        assert_eq!(Method::parse("get"), None);
        assert_eq!(Method::parse("BREW"), None);
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_parse_endpoint_declaration() {
        let (method, template) = parse_endpoint("GET /posts/{postId}").unwrap();
        assert_eq!(method, Method::Get);
        assert_eq!(
            template.segments(),
            &[
                PathSegment::Literal("posts".to_string()),
                PathSegment::Param("postId".to_string())
            ]
        );
        assert_eq!(template.param_names(), vec!["postId"]);
    }

    #[test]
    fn test_parse_endpoint_rejects_malformed() {
        assert!(parse_endpoint("GET/posts").is_err());
        assert!(parse_endpoint("BREW /posts").is_err());
        assert!(parse_endpoint("get /posts").is_err());
        assert!(parse_endpoint("GET posts").is_err());
    }

    #[test]
    fn test_template_rejects_partial_capture() {
        let err = parse_endpoint("GET /posts/v{n}").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPathParameter { .. }));
        assert!(parse_endpoint("GET /posts/{}").is_err());
    }

    #[test]
    fn test_template_rejects_duplicate_params() {
        let err = parse_endpoint("GET /a/{x}/b/{x}").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPathParameter { .. }));
    }

    #[test]
    fn test_template_collapses_empty_segments() {
        let (_, template) = parse_endpoint("GET //posts//{id}/").unwrap();
        assert_eq!(template.segments().len(), 2);
    }

    #[test]
    fn test_match_segments_captures_params() {
        let (_, template) = parse_endpoint("GET /posts/{postId}/comments").unwrap();
        let segs = vec![
            "posts".to_string(),
            "5".to_string(),
            "comments".to_string(),
        ];
        let params = template.match_segments(&segs).unwrap();
        assert_eq!(Value::Object(params), json!({ "postId": "5" }));

        let segs = vec!["posts".to_string(), "5".to_string()];
        assert!(template.match_segments(&segs).is_none());
    }

    #[test]
    fn test_schema_less_endpoint_resolves_empty_bundle() {
        let endpoint = Endpoint::builder("GET /health").build().unwrap();
        let schemas = endpoint.resolve_schemas(None).unwrap();
        assert!(schemas.query.is_none());
        assert!(schemas.response.is_none());
    }

    #[test]
    fn test_inline_schemas_resolve_without_source() {
        let endpoint = Endpoint::builder("GET /posts")
            .query_schema(Schema::object([("bar", Schema::number())]))
            .build()
            .unwrap();
        let schemas = endpoint.resolve_schemas(None).unwrap();
        assert!(schemas.query.is_some());
    }

    struct CountingSource(AtomicUsize);

    impl SchemaSource for CountingSource {
        fn load(&self, endpoint: &str) -> Option<EndpointSchemas> {
            self.0.fetch_add(1, Ordering::SeqCst);
            (endpoint == "GET /posts").then(|| EndpointSchemas {
                query: Some(Schema::object([("bar", Schema::number())])),
                ..EndpointSchemas::default()
            })
        }
    }

    #[test]
    fn test_deferred_resolution_and_caching() {
        let endpoint = Endpoint::builder("GET /posts")
            .deferred_schemas()
            .build()
            .unwrap();
        assert!(endpoint.is_deferred());

        let source = CountingSource(AtomicUsize::new(0));
        endpoint.resolve_schemas(Some(&source)).unwrap();
        endpoint.resolve_schemas(Some(&source)).unwrap();
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deferred_without_source_is_internal_error() {
        let endpoint = Endpoint::builder("GET /posts")
            .deferred_schemas()
            .build()
            .unwrap();
        let err = endpoint.resolve_schemas(None).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_deferred_unknown_endpoint_is_internal_error() {
        let endpoint = Endpoint::builder("GET /other")
            .deferred_schemas()
            .build()
            .unwrap();
        let source = CountingSource(AtomicUsize::new(0));
        let err = endpoint.resolve_schemas(Some(&source)).unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn test_deferred_rejects_inline_schemas() {
        let err = Endpoint::builder("GET /posts")
            .query_schema(Schema::object([("bar", Schema::number())]))
            .deferred_schemas()
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_marker_names_are_validated() {
        let err = Endpoint::builder("GET /posts")
            .response_schema(Schema::object([
                ("comments", Schema::array(Schema::any())),
                ("oops", Schema::selectable()),
            ]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        let err = Endpoint::builder("GET /posts")
            .response_schema(Schema::object([("comments_fields", Schema::selectable())]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        assert!(Endpoint::builder("GET /posts")
            .response_schema(Schema::object([
                ("comments", Schema::array(Schema::any())),
                ("comments_fields", Schema::selectable()),
            ]))
            .build()
            .is_ok());
    }

    #[test]
    fn test_non_object_parameter_schema_rejected() {
        let err = Endpoint::builder("POST /posts")
            .body_schema(Schema::string())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_coercion_plans_are_cached() {
        let endpoint = Endpoint::builder("GET /posts")
            .query_schema(Schema::object([("bar", Schema::number())]))
            .build()
            .unwrap();
        let schemas = endpoint.resolve_schemas(None).unwrap();
        let a = endpoint.query_plan(&schemas).unwrap();
        let b = endpoint.query_plan(&schemas).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(endpoint.path_plan(&schemas).is_none());
    }
}
