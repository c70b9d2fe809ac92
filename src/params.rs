//! Typed access to the path variables of a matched route.
//!
//! ```rust
//! use plumb::{ParamError, UriParams};
//!
//! let params: UriParams = [("id", "42"), ("name", "alice")].into_iter().collect();
//!
//! assert_eq!(params.int("id"), Ok(42));
//! assert!(matches!(params.int("name"), Err(ParamError::Invalid { .. })));
//! assert!(matches!(params.int("age"), Err(ParamError::NotFound(_))));
//! ```

use std::collections::HashMap;

use http::StatusCode;

use crate::error::Error;

/// Path parameter name to raw value, scoped to one request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UriParams(HashMap<String, String>);

/// A path parameter could not be read.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// The route has no parameter by that name.
    #[error("uri param is not found: {0}")]
    NotFound(String),

    /// The parameter exists but does not parse as the requested type.
    #[error("uri param {name} is not a valid {kind} value: {value}")]
    Invalid { name: String, value: String, kind: &'static str },
}

impl ParamError {
    /// A missing parameter is a route/handler mismatch, so it is the server's
    /// fault. An unparsable value came from the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Invalid { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ParamError> for Error {
    fn from(e: ParamError) -> Self {
        Error::new(e.status(), e.to_string())
    }
}

impl UriParams {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// The raw value of `name`.
    pub fn string(&self, name: &str) -> Result<&str, ParamError> {
        self.get(name).ok_or_else(|| ParamError::NotFound(name.to_owned()))
    }

    /// `name` as a base-10 signed integer.
    pub fn int(&self, name: &str) -> Result<i64, ParamError> {
        let raw = self.string(name)?;
        raw.parse().map_err(|_| invalid(name, raw, "int"))
    }

    /// `name` as a base-10 unsigned integer.
    pub fn uint(&self, name: &str) -> Result<u64, ParamError> {
        let raw = self.string(name)?;
        raw.parse().map_err(|_| invalid(name, raw, "uint"))
    }

    /// `name` as a boolean: `1 t T TRUE true True` or `0 f F FALSE false False`.
    pub fn bool(&self, name: &str) -> Result<bool, ParamError> {
        let raw = self.string(name)?;
        match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
            _ => Err(invalid(name, raw, "bool")),
        }
    }
}

fn invalid(name: &str, value: &str, kind: &'static str) -> ParamError {
    ParamError::Invalid { name: name.to_owned(), value: value.to_owned(), kind }
}

impl<K, V> FromIterator<(K, V)> for UriParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
