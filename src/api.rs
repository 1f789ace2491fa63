//! # API Composition
//!
//! Assembly of endpoints into resources and resources into a dispatchable
//! API.
//!
//! A [`Resource`] groups named actions, nested resources, and model schemas.
//! An [`Api`] flattens the whole tree into a route table at build time,
//! wires in plugins, and serves requests through [`Api::handle`], which maps
//! every failure onto a response, or [`Api::try_handle`], which hands errors
//! back to the embedder untouched.
//!
//! Unless disabled, the builder adds a `getOpenapi` action serving a minimal
//! OpenAPI document for the composed endpoints at `GET {base_path}/openapi`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::context::RequestContext;
use crate::endpoint::{Endpoint, Method, SchemaSource};
use crate::error::{ApiError, ApiResult, ConfigError};
use crate::executor;
use crate::middleware::{Middleware, Plugin, PluginSet};
use crate::request::{self, Params};
use crate::router::Router;
use crate::schema::Schema;

/// A named group of actions, nested resources, and model schemas
#[derive(Debug, Clone)]
pub struct Resource {
    summary: String,
    internal: bool,
    actions: Vec<(String, Arc<Endpoint>)>,
    resources: Vec<(String, Resource)>,
    models: Vec<(String, Schema)>,
}

impl Resource {
    /// Start building a resource
    pub fn builder(summary: impl Into<String>) -> ResourceBuilder {
        ResourceBuilder {
            summary: summary.into(),
            internal: false,
            actions: Vec::new(),
            resources: Vec::new(),
            models: Vec::new(),
        }
    }

    /// Human-readable summary
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Whether the resource is marked internal
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        self.internal
    }

    /// Named actions in declaration order
    #[must_use]
    pub fn actions(&self) -> &[(String, Arc<Endpoint>)] {
        &self.actions
    }

    /// Nested resources in declaration order
    #[must_use]
    pub fn resources(&self) -> &[(String, Resource)] {
        &self.resources
    }

    /// Named model schemas
    #[must_use]
    pub fn models(&self) -> &[(String, Schema)] {
        &self.models
    }

    /// Endpoints of this resource and everything nested beneath it
    ///
    /// Depth-first: a resource's own actions come before its nested
    /// resources, both in declaration order.
    #[must_use]
    pub fn all_endpoints(&self) -> Vec<Arc<Endpoint>> {
        let mut out = Vec::new();
        self.collect_endpoints(&mut out);
        out.into_iter().map(|(_, endpoint)| endpoint).collect()
    }

    fn collect_endpoints(&self, out: &mut Vec<(String, Arc<Endpoint>)>) {
        for (name, endpoint) in &self.actions {
            out.push((name.clone(), Arc::clone(endpoint)));
        }
        for (_, resource) in &self.resources {
            resource.collect_endpoints(out);
        }
    }
}

/// Builder for [`Resource`]
pub struct ResourceBuilder {
    summary: String,
    internal: bool,
    actions: Vec<(String, Arc<Endpoint>)>,
    resources: Vec<(String, Resource)>,
    models: Vec<(String, Schema)>,
}

impl ResourceBuilder {
    /// Mark the resource internal, hiding it from generated documentation
    #[must_use]
    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// Add a named action
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.actions.push((name.into(), Arc::new(endpoint)));
        self
    }

    /// Nest a resource
    #[must_use]
    pub fn resource(mut self, name: impl Into<String>, resource: Resource) -> Self {
        self.resources.push((name.into(), resource));
        self
    }

    /// Register a named model schema
    #[must_use]
    pub fn model(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.models.push((name.into(), schema));
        self
    }

    /// Validate names and build the resource
    pub fn build(self) -> Result<Resource, ConfigError> {
        let mut seen = HashSet::new();
        for (name, _) in &self.actions {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateAction {
                    resource: self.summary,
                    name: name.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for (name, _) in &self.resources {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateResource {
                    resource: self.summary,
                    name: name.clone(),
                });
            }
        }
        Ok(Resource {
            summary: self.summary,
            internal: self.internal,
            actions: self.actions,
            resources: self.resources,
            models: self.models,
        })
    }
}

/// Network-agnostic response produced by [`Api::handle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// JSON body, absent for bodyless responses
    pub body: Option<Value>,
}

/// Fully composed, dispatchable API
pub struct Api {
    base_path: String,
    router: Router,
    middlewares: Vec<Arc<dyn Middleware>>,
    statics: Arc<Map<String, Value>>,
    source: Option<Arc<dyn SchemaSource>>,
    resources: Vec<(String, Resource)>,
}

impl Api {
    /// Start building an API
    #[must_use]
    pub fn builder() -> ApiBuilder {
        ApiBuilder::default()
    }

    /// Base path used for the generated OpenAPI endpoint
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Route table over every composed endpoint
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// Top-level resources in declaration order
    #[must_use]
    pub fn resources(&self) -> &[(String, Resource)] {
        &self.resources
    }

    /// Every routable endpoint: top-level actions first, then resources
    /// depth-first, all in declaration order
    #[must_use]
    pub fn all_endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.router.endpoints().to_vec()
    }

    /// Handle a request, mapping every failure onto a response
    pub async fn handle(
        &self,
        method: Method,
        target: &str,
        headers: HashMap<String, String>,
        body: Option<Value>,
    ) -> ApiResponse {
        match self.try_handle(method, target, headers, body).await {
            Ok(response) => {
                info!(method = %method, target, status = response.status, "handled request");
                response
            }
            Err(err) => {
                let status = err.status_code();
                if status >= 500 {
                    error!(method = %method, target, status, error = ?err, "request failed");
                } else {
                    debug!(method = %method, target, status, error = %err, "request rejected");
                }
                ApiResponse {
                    status,
                    body: Some(err.response_body()),
                }
            }
        }
    }

    /// Handle a request, returning failures to the caller untouched
    ///
    /// For embedders that run their own error handling. Routing failures
    /// surface as [`ApiError::NotFound`] and [`ApiError::MethodNotAllowed`];
    /// nothing is logged or turned into an error body here.
    pub async fn try_handle(
        &self,
        method: Method,
        target: &str,
        headers: HashMap<String, String>,
        body: Option<Value>,
    ) -> ApiResult<ApiResponse> {
        let (path, query) = request::parse_target(target);
        let Some(matched) = self.router.match_route(method, &path) else {
            let allowed = self.router.allowed_methods(&path);
            if allowed.is_empty() {
                return Err(ApiError::NotFound);
            }
            return Err(ApiError::MethodNotAllowed { method, allowed });
        };
        let params = Params {
            path: matched.path_params,
            query,
            body,
            headers,
        };
        let ctx = RequestContext::new(
            Arc::clone(&matched.endpoint),
            params.headers.clone(),
            Arc::clone(&self.statics),
        );
        let body = executor::execute(
            &matched.endpoint,
            &params,
            &ctx,
            &self.middlewares,
            self.source.as_deref(),
        )
        .await?;
        Ok(ApiResponse { status: 200, body })
    }
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("base_path", &self.base_path)
            .field("routes", &self.router.len())
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Api`]
pub struct ApiBuilder {
    base_path: String,
    title: String,
    version: String,
    actions: Vec<(String, Arc<Endpoint>)>,
    resources: Vec<(String, Resource)>,
    plugins: PluginSet,
    source: Option<Arc<dyn SchemaSource>>,
    openapi_endpoint: Option<String>,
    openapi_disabled: bool,
}

impl Default for ApiBuilder {
    fn default() -> Self {
        Self {
            base_path: "/api".to_string(),
            title: "API".to_string(),
            version: "1.0.0".to_string(),
            actions: Vec::new(),
            resources: Vec::new(),
            plugins: PluginSet::new(),
            source: None,
            openapi_endpoint: None,
            openapi_disabled: false,
        }
    }
}

impl ApiBuilder {
    /// Base path for the generated OpenAPI endpoint; defaults to `/api`
    #[must_use]
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Title and version reported in the OpenAPI document
    #[must_use]
    pub fn info(mut self, title: impl Into<String>, version: impl Into<String>) -> Self {
        self.title = title.into();
        self.version = version.into();
        self
    }

    /// Add a top-level action
    #[must_use]
    pub fn action(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.actions.push((name.into(), Arc::new(endpoint)));
        self
    }

    /// Add a resource
    #[must_use]
    pub fn resource(mut self, name: impl Into<String>, resource: Resource) -> Self {
        self.resources.push((name.into(), resource));
        self
    }

    /// Register a plugin; middleware order follows registration order
    #[must_use]
    pub fn plugin<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.plugins.register(plugin);
        self
    }

    /// Schema source for endpoints built with deferred schemas
    #[must_use]
    pub fn schema_source<S: SchemaSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Serve the OpenAPI document at a custom declaration instead of
    /// `GET {base_path}/openapi`
    #[must_use]
    pub fn openapi_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.openapi_endpoint = Some(endpoint.into());
        self
    }

    /// Skip the generated OpenAPI endpoint entirely
    #[must_use]
    pub fn disable_openapi(mut self) -> Self {
        self.openapi_disabled = true;
        self
    }

    /// Validate the composition and build the API
    pub fn build(mut self) -> Result<Api, ConfigError> {
        if !self.openapi_disabled {
            let mut named = self.actions.clone();
            for (_, resource) in &self.resources {
                resource.collect_endpoints(&mut named);
            }
            let doc = Arc::new(build_openapi_doc(&self.title, &self.version, &named));
            let decl = self
                .openapi_endpoint
                .take()
                .unwrap_or_else(|| format!("GET {}/openapi", self.base_path));
            let endpoint = Endpoint::builder(decl)
                .summary("OpenAPI document for this API")
                .response_schema(Schema::any())
                .handler_fn(move |_params, _ctx| {
                    let doc = Arc::clone(&doc);
                    async move { Ok((*doc).clone()) }
                })
                .build()?;
            self.actions
                .push(("getOpenapi".to_string(), Arc::new(endpoint)));
        }

        let mut seen = HashSet::new();
        for (name, _) in &self.actions {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateAction {
                    resource: self.base_path,
                    name: name.clone(),
                });
            }
        }
        let mut seen = HashSet::new();
        for (name, _) in &self.resources {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateResource {
                    resource: self.base_path,
                    name: name.clone(),
                });
            }
        }

        let mut endpoints: Vec<Arc<Endpoint>> = self
            .actions
            .iter()
            .map(|(_, endpoint)| Arc::clone(endpoint))
            .collect();
        for (_, resource) in &self.resources {
            endpoints.extend(resource.all_endpoints());
        }
        if self.source.is_none() && endpoints.iter().any(|e| e.is_deferred()) {
            warn!("deferred endpoints registered without a schema source; they will fail at request time");
        }

        Ok(Api {
            base_path: self.base_path,
            router: Router::new(endpoints),
            middlewares: self.plugins.middlewares(),
            statics: Arc::new(self.plugins.statics()),
            source: self.source,
            resources: self.resources,
        })
    }
}

fn build_openapi_doc(
    title: &str,
    version: &str,
    endpoints: &[(String, Arc<Endpoint>)],
) -> Value {
    let mut paths: Map<String, Value> = Map::new();
    for (name, endpoint) in endpoints {
        let entry = paths
            .entry(endpoint.template().raw().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = entry {
            let mut op = Map::new();
            op.insert("operationId".to_string(), Value::String(name.clone()));
            if let Some(summary) = endpoint.summary() {
                op.insert("summary".to_string(), Value::String(summary.to_string()));
            }
            if let Some(description) = endpoint.description() {
                op.insert(
                    "description".to_string(),
                    Value::String(description.to_string()),
                );
            }
            methods.insert(
                endpoint.method().as_str().to_lowercase(),
                Value::Object(op),
            );
        }
    }
    json!({
        "openapi": "3.1.0",
        "info": { "title": title, "version": version },
        "paths": paths
    })
}
