//! # Middleware and Plugins
//!
//! Pre-validation hooks and the plugin packaging that registers them.
//!
//! Middleware runs after routing and schema resolution but before coercion
//! and validation, in registration order. The first error aborts the
//! pipeline and becomes the response, so an auth rejection surfaces before
//! any parameter handling. A [`Plugin`] bundles an optional middleware with
//! optional static data exposed to handlers through the request context.
//!
//! ## Design Principles (SOLID)
//!
//! - **Single Responsibility**: each middleware covers one concern
//! - **Open/Closed**: new behavior plugs in without touching the executor
//! - **Liskov Substitution**: any `Arc<dyn Middleware>` slots into the chain
//! - **Interface Segregation**: plugins opt into statics and middleware independently
//! - **Dependency Inversion**: the executor depends on these traits, never on implementations

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::error::ApiResult;
use crate::request::Params;

/// Boxed future returned by middleware implementations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pre-validation request hook
///
/// Returning an error stops the pipeline and the error is mapped to a
/// response as-is, so middleware can reject with any
/// [`ApiError`](crate::error::ApiError) variant.
pub trait Middleware: Send + Sync {
    /// Middleware name used in logs
    fn name(&self) -> &'static str {
        "Unknown"
    }

    /// Inspect the raw request before coercion and validation
    fn handle<'a>(
        &'a self,
        params: &'a Params,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, ApiResult<()>>;
}

/// Packaged extension registered on an API
pub trait Plugin: Send + Sync {
    /// Unique plugin name; also the key under which its statics appear
    fn name(&self) -> &'static str;

    /// Static data exposed to every request via
    /// [`RequestContext::plugin_statics`]
    fn statics(&self) -> Option<Value> {
        None
    }

    /// Middleware contributed to the pipeline, if any
    fn middleware(&self) -> Option<Arc<dyn Middleware>> {
        None
    }
}

/// Ordered collection of registered plugins
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginSet {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin at the end of the chain
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) {
        self.plugins.push(Arc::new(plugin));
    }

    /// Number of registered plugins
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Collected statics, keyed by plugin name
    pub(crate) fn statics(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for plugin in &self.plugins {
            if let Some(value) = plugin.statics() {
                out.insert(plugin.name().to_string(), value);
            }
        }
        out
    }

    /// Contributed middlewares in registration order
    pub(crate) fn middlewares(&self) -> Vec<Arc<dyn Middleware>> {
        self.plugins
            .iter()
            .filter_map(|plugin| plugin.middleware())
            .collect()
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.plugins.iter().map(|p| p.name()).collect();
        f.debug_struct("PluginSet").field("plugins", &names).finish()
    }
}

/// Run a middleware chain in order, stopping at the first error
pub(crate) async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    params: &Params,
    ctx: &RequestContext,
) -> ApiResult<()> {
    for mw in chain {
        debug!(middleware = mw.name(), "running middleware");
        mw.handle(params, ctx).await?;
    }
    Ok(())
}

/// Plugin that logs each request before validation
///
/// Useful as a development aid and as a template for writing custom plugins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlugin;

struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "Logging"
    }

    fn handle<'a>(
        &'a self,
        params: &'a Params,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, ApiResult<()>> {
        Box::pin(async move {
            info!(
                endpoint = ctx.endpoint().endpoint(),
                query_params = params.query.len(),
                has_body = params.body.is_some(),
                "handling request"
            );
            Ok(())
        })
    }
}

impl Plugin for LoggingPlugin {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn middleware(&self) -> Option<Arc<dyn Middleware>> {
        Some(Arc::new(LoggingMiddleware))
    }
}
