//! # Routing
//!
//! First-match-wins route table over parsed path templates.
//!
//! Matching is a linear scan in registration order: method must be equal,
//! segment counts must line up, literals compare exactly, and every `{name}`
//! capture swallows exactly one decoded segment. Overlapping templates are
//! legal; structurally ambiguous pairs are reported once at construction and
//! the first registered route wins at request time.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::endpoint::{Endpoint, Method, PathSegment};
use crate::request::split_path;

/// Successful route match
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Matched endpoint
    pub endpoint: Arc<Endpoint>,
    /// Captured path parameters, values as raw strings
    pub path_params: Map<String, Value>,
}

/// Ordered route table
#[derive(Debug)]
pub struct Router {
    routes: Vec<Arc<Endpoint>>,
}

impl Router {
    /// Build a router over the given endpoints, preserving their order
    #[must_use]
    pub fn new(endpoints: impl IntoIterator<Item = Arc<Endpoint>>) -> Self {
        let routes: Vec<Arc<Endpoint>> = endpoints.into_iter().collect();
        for (i, a) in routes.iter().enumerate() {
            for b in routes.iter().skip(i + 1) {
                if a.method() == b.method()
                    && templates_overlap(a.template().segments(), b.template().segments())
                {
                    warn!(
                        first = a.endpoint(),
                        second = b.endpoint(),
                        "structurally ambiguous route templates; the first registered wins"
                    );
                }
            }
        }
        Self { routes }
    }

    /// Endpoints in registration order
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.routes
    }

    /// Match a method and raw request path against the table
    #[must_use]
    pub fn match_route(&self, method: Method, path: &str) -> Option<RouteMatch> {
        let segments = split_path(path);
        for route in &self.routes {
            if route.method() != method {
                continue;
            }
            if let Some(path_params) = route.template().match_segments(&segments) {
                debug!(endpoint = route.endpoint(), path, "route matched");
                return Some(RouteMatch {
                    endpoint: Arc::clone(route),
                    path_params,
                });
            }
        }
        debug!(method = %method, path, "no route matched");
        None
    }

    /// Methods that would match the path, in canonical order
    ///
    /// Distinguishes a 404 from a 405 and fills the latter's allowed list.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let segments = split_path(path);
        Method::ALL
            .into_iter()
            .filter(|method| {
                self.routes.iter().any(|route| {
                    route.method() == *method
                        && route.template().match_segments(&segments).is_some()
                })
            })
            .collect()
    }

    /// Number of routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn templates_overlap(a: &[PathSegment], b: &[PathSegment]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (PathSegment::Literal(l), PathSegment::Literal(r)) => l == r,
            _ => true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(decl: &str) -> Arc<Endpoint> {
        Arc::new(Endpoint::builder(decl).build().unwrap())
    }

    #[test]
    fn test_match_captures_path_params() {
        let router = Router::new([route("GET /posts/{postId}/comments/{commentId}")]);
        let matched = router.match_route(Method::Get, "/posts/5/comments/9").unwrap();
        assert_eq!(
            Value::Object(matched.path_params),
            json!({ "postId": "5", "commentId": "9" })
        );
    }

    #[test]
    fn test_match_decodes_segments() {
        let router = Router::new([route("GET /tags/{tag}")]);
        let matched = router.match_route(Method::Get, "/tags/a%2Fb").unwrap();
        assert_eq!(matched.path_params["tag"], json!("a/b"));
    }

    #[test]
    fn test_method_must_match() {
        let router = Router::new([route("POST /posts")]);
        assert!(router.match_route(Method::Get, "/posts").is_none());
        assert!(router.match_route(Method::Post, "/posts").is_some());
    }

    #[test]
    fn test_first_registered_route_wins() {
        let router = Router::new([route("GET /posts/{postId}"), route("GET /posts/latest")]);
        let matched = router.match_route(Method::Get, "/posts/latest").unwrap();
        assert_eq!(matched.endpoint.endpoint(), "GET /posts/{postId}");
        assert_eq!(matched.path_params["postId"], json!("latest"));

        let router = Router::new([route("GET /posts/latest"), route("GET /posts/{postId}")]);
        let matched = router.match_route(Method::Get, "/posts/latest").unwrap();
        assert_eq!(matched.endpoint.endpoint(), "GET /posts/latest");
        assert!(matched.path_params.is_empty());
    }

    #[test]
    fn test_trailing_and_duplicate_slashes_collapse() {
        let router = Router::new([route("GET /posts/{postId}")]);
        assert!(router.match_route(Method::Get, "/posts/5/").is_some());
        assert!(router.match_route(Method::Get, "//posts//5").is_some());
        assert!(router.match_route(Method::Get, "/posts").is_none());
    }

    #[test]
    fn test_allowed_methods_in_canonical_order() {
        let router = Router::new([
            route("DELETE /posts/{postId}"),
            route("POST /posts/{postId}"),
            route("GET /posts/{postId}"),
        ]);
        assert_eq!(
            router.allowed_methods("/posts/5"),
            vec![Method::Get, Method::Post, Method::Delete]
        );
        assert!(router.allowed_methods("/nowhere").is_empty());
    }
}
