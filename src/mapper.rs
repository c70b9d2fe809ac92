//! Converting handler errors into client-visible responses.
//!
//! A handler error goes through exactly one mapping, inside the router:
//!
//! ```text
//! Err(e) ──► ErrorMapper (custom or default) ──► HandlerError { status, payload, notify }
//!                                                   ├── notify? ──► Notifier
//!                                                   └── payload ──► respond_json
//! ```

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::error::{DynError, Error};
use crate::params::ParamError;

/// The normalised form of a failed request.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerError {
    pub status: StatusCode,
    /// Written as the JSON response body.
    pub payload: serde_json::Value,
    /// Report the failure to the [`Notifier`](crate::Notifier).
    pub notify: bool,
}

impl HandlerError {
    /// Builds a `HandlerError` from any serialisable payload. A payload that
    /// fails to serialise is replaced by a message saying so.
    pub fn new(status: StatusCode, payload: &impl Serialize, notify: bool) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            serde_json::json!({ "message": format!("unserialisable error payload: {e}") })
        });
        Self { status, payload, notify }
    }
}

impl From<&Error> for HandlerError {
    fn from(err: &Error) -> Self {
        Self::new(err.status(), err, err.status().is_server_error())
    }
}

/// The signature of the default mapping, handed to custom mappers so they can
/// delegate the cases they do not care about.
pub type DefaultMapper = fn(&DynError) -> HandlerError;

/// The default error mapping.
///
/// Declared errors ([`Error`], [`ParamError`]) keep their status and message
/// and are notified only when the status is 5xx. Anything else becomes a 500
/// carrying the error's message, always notified.
pub fn default_error_mapper(err: &DynError) -> HandlerError {
    if let Some(declared) = err.downcast_ref::<Error>() {
        return declared.into();
    }
    if let Some(param) = err.downcast_ref::<ParamError>() {
        return (&Error::from(param.clone())).into();
    }

    let undeclared = Error::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    HandlerError::new(undeclared.status(), &undeclared, true)
}

/// A custom, application-wide error mapping.
///
/// ```rust
/// use http::StatusCode;
/// use plumb::{Error, ErrorMapper, HandlerError};
///
/// let mapper = ErrorMapper::new(|err, default| {
///     if err.to_string() == "maintenance" {
///         let e = Error::new(StatusCode::SERVICE_UNAVAILABLE, "back soon");
///         return HandlerError::new(e.status(), &e, false);
///     }
///     default(err)
/// });
/// ```
#[derive(Clone)]
pub struct ErrorMapper(Arc<dyn Fn(&DynError, DefaultMapper) -> HandlerError + Send + Sync>);

impl ErrorMapper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DynError, DefaultMapper) -> HandlerError + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn map(&self, err: &DynError) -> HandlerError {
        (self.0)(err, default_error_mapper)
    }
}

impl Default for ErrorMapper {
    fn default() -> Self {
        Self::new(|err, default| default(err))
    }
}

impl fmt::Debug for ErrorMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorMapper")
    }
}
