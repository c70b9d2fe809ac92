//! Error types.
//!
//! Two families live here. [`Error`] is the *declared* HTTP error: a status
//! code plus a client-visible message, serialised as the response body when a
//! handler returns it. [`RouteError`] and [`ServeError`] are infrastructure
//! failures: a bad route table at startup, or a server that could not run.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

/// A type-erased error returned by a handler.
pub type BoxError = Box<DynError>;

/// The trait-object form of [`BoxError`], as seen by error mappers.
pub type DynError = dyn std::error::Error + Send + Sync + 'static;

/// A declared HTTP error.
///
/// Returning one from a handler means "I know what went wrong": the router
/// passes its status and message through unchanged instead of turning it into
/// a 500. Serialises as `{"code": "bad_request", "message": "..."}`.
///
/// ```rust
/// use http::StatusCode;
/// use plumb::Error;
///
/// let err = Error::new(StatusCode::BAD_REQUEST, "error occurred");
/// assert_eq!(err.to_string(), "400 bad_request: error occurred");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Error {
    #[serde(skip)]
    status: StatusCode,
    code: String,
    message: String,
}

impl Error {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, code: status_code_name(status), message: message.into() }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn code(&self) -> &str { &self.code }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.code, self.message)
    }
}

impl std::error::Error for Error {}

/// `Bad Request` -> `bad_request`. Unregistered codes fall back to `status_<n>`.
fn status_code_name(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => reason
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect(),
        None => format!("status_{}", status.as_u16()),
    }
}

/// A route could not be registered.
///
/// Surfaced when the route table is built, never while serving.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("route pattern is empty")]
    EmptyPattern,

    #[error("malformed route pattern `{pattern}`: {reason}")]
    Malformed { pattern: String, reason: &'static str },

    #[error("invalid route `{pattern}`: {source}")]
    Insert {
        pattern: String,
        #[source]
        source: matchit::InsertError,
    },
}

/// The server could not start or failed while serving.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("invalid PORT value `{0}`")]
    InvalidPort(String),

    #[error("installing signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    #[error("error in serve: {0}")]
    Accept(#[source] std::io::Error),

    #[error("tls configuration: {0}")]
    Tls(String),

    #[error("serve task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}
