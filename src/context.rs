//! # Request Context
//!
//! Per-request state threaded through middleware and handlers: the matched
//! endpoint, request headers, plugin statics, typed extension storage, and
//! the validated parameters once the executor records them.
//!
//! The context is cheap to clone. All interior state is shared, so a clone
//! held by a handler observes values a middleware stored earlier in the
//! pipeline.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use crate::endpoint::Endpoint;

/// Typed per-request extension storage
///
/// Middleware stores values keyed by their type; handlers read them back
/// with [`Extensions::get`]. One value per type; inserting again replaces.
#[derive(Clone, Default)]
pub struct Extensions {
    values: Arc<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl Extensions {
    /// Store a value, replacing any previous value of the same type
    pub fn insert<T: Any + Send + Sync>(&self, value: T) {
        self.values
            .write()
            .expect("Extensions lock poisoned")
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Clone out the stored value of type `T`, if any
    #[must_use]
    pub fn get<T: Any + Send + Sync + Clone>(&self) -> Option<T> {
        self.values
            .read()
            .expect("Extensions lock poisoned")
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .map(Clone::clone)
    }

    /// Whether a value of type `T` is present
    #[must_use]
    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.values
            .read()
            .expect("Extensions lock poisoned")
            .contains_key(&TypeId::of::<T>())
    }

    /// Remove the stored value of type `T`
    pub fn remove<T: Any + Send + Sync>(&self) {
        self.values
            .write()
            .expect("Extensions lock poisoned")
            .remove(&TypeId::of::<T>());
    }

    /// Number of stored values
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().expect("Extensions lock poisoned").len()
    }

    /// Whether the storage is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.len())
            .finish()
    }
}

/// Validated parameters recorded by the executor after coercion
#[derive(Debug, Clone, Default)]
pub struct ParsedParams {
    /// Validated path parameters
    pub path: Option<Value>,
    /// Validated query parameters
    pub query: Option<Value>,
    /// Validated body
    pub body: Option<Value>,
}

/// Per-request context handed to middleware and handlers
#[derive(Clone)]
pub struct RequestContext {
    endpoint: Arc<Endpoint>,
    headers: Arc<HashMap<String, String>>,
    statics: Arc<Map<String, Value>>,
    extensions: Extensions,
    parsed: Arc<RwLock<ParsedParams>>,
}

impl RequestContext {
    pub(crate) fn new(
        endpoint: Arc<Endpoint>,
        headers: HashMap<String, String>,
        statics: Arc<Map<String, Value>>,
    ) -> Self {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        Self {
            endpoint,
            headers: Arc::new(headers),
            statics,
            extensions: Extensions::default(),
            parsed: Arc::new(RwLock::new(ParsedParams::default())),
        }
    }

    /// Endpoint the router matched for this request
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Header value by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Static data contributed by the named plugin at registration time
    #[must_use]
    pub fn plugin_statics(&self, name: &str) -> Option<&Value> {
        self.statics.get(name)
    }

    /// Typed per-request extension storage
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Snapshot of the validated parameters
    ///
    /// Empty until the executor finishes coercion and validation. Middleware
    /// runs before that point and sees the raw
    /// [`Params`](crate::request::Params) instead.
    #[must_use]
    pub fn parsed(&self) -> ParsedParams {
        self.parsed.read().expect("Context lock poisoned").clone()
    }

    pub(crate) fn record_parsed(&self, parsed: ParsedParams) {
        *self.parsed.write().expect("Context lock poisoned") = parsed;
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("endpoint", &self.endpoint.endpoint())
            .field("headers", &self.headers.len())
            .field("extensions", &self.extensions)
            .finish()
    }
}
