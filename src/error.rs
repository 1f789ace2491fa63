//! # Error Handling
//!
//! Configuration-time and request-time error types.
//!
//! [`ConfigError`] covers faults detected while declaring endpoints and
//! composing APIs; these abort startup. [`ApiError`] covers request-time
//! failures and maps each variant onto a status code and a JSON body.
//! Internal errors carry full context for logs but always render the same
//! generic body, so details never leak to clients.

use serde_json::{json, Value};
use thiserror::Error;

use crate::endpoint::Method;
use crate::validation::Issue;

/// Convenience alias for request-time results
pub type ApiResult<T> = Result<T, ApiError>;

/// Configuration fault detected while building endpoints, resources, or APIs
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint declaration or schema bundle is malformed
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// Offending declaration string
        endpoint: String,
        /// What was wrong with it
        reason: String,
    },
    /// Path template segment is not a valid `{name}` capture
    #[error("invalid path parameter '{segment}' in endpoint '{endpoint}'")]
    InvalidPathParameter {
        /// Offending declaration string
        endpoint: String,
        /// Offending segment
        segment: String,
    },
    /// Two actions share a name within one resource
    #[error("duplicate action '{name}' in resource '{resource}'")]
    DuplicateAction {
        /// Resource (or API base path) carrying the duplicate
        resource: String,
        /// Duplicated action name
        name: String,
    },
    /// Two nested resources share a name
    #[error("duplicate resource '{name}' in '{resource}'")]
    DuplicateResource {
        /// Resource (or API base path) carrying the duplicate
        resource: String,
        /// Duplicated resource name
        name: String,
    },
}

/// Request-time failure mapped onto a status code and JSON body
#[derive(Debug, Error)]
pub enum ApiError {
    /// Parameters failed coercion or validation
    #[error("{message}")]
    BadRequest {
        /// Human-readable summary of every issue
        message: String,
        /// Structured issues, one per failing location
        issues: Vec<Issue>,
    },
    /// Request lacks valid credentials
    #[error("unauthorized")]
    Unauthorized,
    /// Credentials are valid but do not grant access
    #[error("forbidden")]
    Forbidden,
    /// No route matches the request path
    #[error("not found")]
    NotFound,
    /// The path exists but not for this method
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        /// Requested method
        method: Method,
        /// Methods that would have matched, in canonical order
        allowed: Vec<Method>,
    },
    /// Handler-chosen status and body, passed through verbatim
    #[error("request failed with status {status}")]
    Custom {
        /// HTTP status code
        status: u16,
        /// Response body
        body: Value,
    },
    /// Unexpected failure; details are logged, never sent
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Bad-request error aggregating the given issues
    ///
    /// The message lists every issue with its dotted path, in the style
    /// `Required at "<body>.content"; Expected number, received string at
    /// "<query>.bar"`.
    #[must_use]
    pub fn bad_request(issues: Vec<Issue>) -> Self {
        let message = issues
            .iter()
            .map(|issue| format!("{} at \"{}\"", issue.message, issue.path_string()))
            .collect::<Vec<_>>()
            .join("; ");
        Self::BadRequest { message, issues }
    }

    /// Error with a handler-chosen status code and body
    #[must_use]
    pub const fn custom(status: u16, body: Value) -> Self {
        Self::Custom { status, body }
    }

    /// Internal error from a plain message
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(message.into()))
    }

    /// HTTP status code served for this error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::Custom { status, .. } => *status,
            Self::Internal(_) => 500,
        }
    }

    /// JSON body served for this error
    ///
    /// Internal errors always render the same generic body; whatever they
    /// carry stays in the logs.
    #[must_use]
    pub fn response_body(&self) -> Value {
        match self {
            Self::BadRequest { message, issues } => json!({
                "error": "bad request",
                "message": message,
                "issues": issues,
            }),
            Self::Unauthorized => json!({ "error": "unauthorized" }),
            Self::Forbidden => json!({ "error": "forbidden" }),
            Self::NotFound => json!({ "error": "not found" }),
            Self::MethodNotAllowed { method, allowed } => {
                let list: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
                json!({
                    "message": format!("No handler for {method}; only {}.", list.join(", "))
                })
            }
            Self::Custom { body, .. } => body.clone(),
            Self::Internal(_) => json!({ "error": "internal server error" }),
        }
    }
}
