//! # Request Execution
//!
//! The staged pipeline that turns a matched route into a response value:
//! schema resolution, middleware, coercion and validation, handler
//! invocation, and response validation.
//!
//! Validation issues from the query, path, and body stages are aggregated
//! into one bad-request error instead of stopping at the first failing
//! stage, so a client sees every parameter problem at once. Middleware and
//! handler errors abort immediately and surface as-is. Response violations
//! never reach the client; they are logged and reported as an internal
//! error.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::{ParsedParams, RequestContext};
use crate::endpoint::{Endpoint, SchemaSource};
use crate::error::{ApiError, ApiResult};
use crate::middleware::{self, Middleware};
use crate::project::Projection;
use crate::request::Params;
use crate::validation::{self, Issue};

/// Run the full pipeline for a matched endpoint
///
/// Returns the validated response value, or `None` for endpoints without a
/// response schema.
pub(crate) async fn execute(
    endpoint: &Arc<Endpoint>,
    params: &Params,
    ctx: &RequestContext,
    chain: &[Arc<dyn Middleware>],
    source: Option<&dyn SchemaSource>,
) -> ApiResult<Option<Value>> {
    let schemas = endpoint.resolve_schemas(source)?;

    middleware::run_chain(chain, params, ctx).await?;

    let mut issues: Vec<Issue> = Vec::new();

    let query = match &schemas.query {
        Some(schema) => {
            let raw = Value::Object(params.query.clone());
            let coerced = match endpoint.query_plan(&schemas) {
                Some(plan) => plan.apply(raw),
                None => raw,
            };
            collect(
                validation::parse_request(schema, Some(&coerced), "<query>"),
                &mut issues,
            )
        }
        None => None,
    };

    let path = match &schemas.path {
        Some(schema) => {
            let raw = Value::Object(params.path.clone());
            let coerced = match endpoint.path_plan(&schemas) {
                Some(plan) => plan.apply(raw),
                None => raw,
            };
            collect(
                validation::parse_request(schema, Some(&coerced), "<path>"),
                &mut issues,
            )
        }
        None => None,
    };

    // bodies arrive as typed JSON and are never coerced
    let body = match &schemas.body {
        Some(schema) => collect(
            validation::parse_request(schema, params.body.as_ref(), "<body>"),
            &mut issues,
        ),
        None => None,
    };

    if !issues.is_empty() {
        return Err(ApiError::bad_request(issues));
    }

    ctx.record_parsed(ParsedParams {
        path: path.clone(),
        query: query.clone(),
        body: body.clone(),
    });

    let projection = Projection::from_query(schemas.query.as_ref(), query.as_ref());

    let Some(handler) = endpoint.handler() else {
        return Err(ApiError::internal(format!(
            "no handler defined for endpoint {}",
            endpoint.endpoint()
        )));
    };
    let merged = merge_params(path, query, body);
    debug!(endpoint = endpoint.endpoint(), "invoking handler");
    let output = handler(merged, ctx.clone()).await?;

    match &schemas.response {
        None => Ok(None),
        Some(schema) => match validation::parse_response(schema, &output, &projection) {
            Ok(validated) => Ok(validated),
            Err(violations) => {
                warn!(
                    endpoint = endpoint.endpoint(),
                    issues = ?violations,
                    "response failed validation"
                );
                Err(ApiError::internal(format!(
                    "response validation failed for endpoint {}",
                    endpoint.endpoint()
                )))
            }
        },
    }
}

fn collect(result: Result<Option<Value>, Vec<Issue>>, issues: &mut Vec<Issue>) -> Option<Value> {
    match result {
        Ok(value) => value,
        Err(mut stage_issues) => {
            issues.append(&mut stage_issues);
            None
        }
    }
}

/// Merge the validated stages into the single handler argument. Later
/// stages win on key collisions: path, then query, then body.
fn merge_params(path: Option<Value>, query: Option<Value>, body: Option<Value>) -> Value {
    let mut merged = Map::new();
    for stage in [path, query, body] {
        if let Some(Value::Object(map)) = stage {
            merged.extend(map);
        }
    }
    Value::Object(merged)
}
