//! # Trellis
//!
//! Schema-driven core for declarative REST APIs.
//! Provides endpoint declarations, parameter coercion and validation,
//! include/select response projection, and plugin middleware.
//!
//! ## Architecture
//!
//! APIs are declared up front: endpoints carry a `METHOD /path` template
//! plus optional schemas for path, query, body, and response; resources
//! group endpoints into named actions; [`Api`] flattens the tree into a
//! router. Per request, an internal executor resolves schemas, runs the
//! middleware chain, coerces and validates parameters stage by stage,
//! derives the projection from the validated query, invokes the handler,
//! and validates the response before it leaves the process.
//!
//! ## Modules
//!
//! - `api` - API composition: resources, actions, plugins, OpenAPI document
//! - `coerce` - String-to-typed coercion plans compiled from schemas
//! - `context` - Per-request context: headers, plugin statics, typed extensions
//! - `endpoint` - Endpoint declarations, path templates, schema bundles
//! - `error` - Configuration-time and request-time error types
//! - `middleware` - Middleware and plugin traits, plugin registration
//! - `pagination` - Cursor pagination parameter and response schemas
//! - `project` - Include/select projection over response trees
//! - `request` - Query string, path, and request parameter parsing
//! - `router` - Method-aware route template matching
//! - `schema` - Declarative schemas with includable and selectable fields
//! - `validation` - Structured issues and schema-directed tree walking

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use tracing_subscriber::EnvFilter;

pub mod api;
pub mod coerce;
pub mod context;
pub mod endpoint;
pub mod error;
mod executor;
pub mod middleware;
pub mod pagination;
pub mod project;
pub mod request;
pub mod router;
pub mod schema;
pub mod validation;

pub use api::{Api, ApiBuilder, ApiResponse, Resource, ResourceBuilder};
pub use coerce::CoercePlan;
pub use context::{Extensions, ParsedParams, RequestContext};
pub use endpoint::{
    Endpoint, EndpointBuilder, EndpointSchemas, Handler, handler_fn, HandlerResult, Method,
    PathTemplate, SchemaSource,
};
pub use error::{ApiError, ApiResult, ConfigError};
pub use middleware::{BoxFuture, LoggingPlugin, Middleware, Plugin, PluginSet};
pub use pagination::{DEFAULT_PAGE_SIZE, page_response, pagination_params};
pub use project::Projection;
pub use request::{Params, parse_query_string, parse_target};
pub use router::{RouteMatch, Router};
pub use schema::{Field, LeafKind, Meta, Schema};
pub use validation::{Issue, IssueCode, parse_request, parse_response, PathSeg};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize JSON tracing output for the library
///
/// Honors `RUST_LOG` when set and defaults this crate to `info`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trellis=info".parse().unwrap()))
        .json()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.1");
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
