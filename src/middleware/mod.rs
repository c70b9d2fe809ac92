//! Middleware layer.
//!
//! A [`Middleware`] takes the next [`RawHandler`] and returns a new one
//! wrapping it. It is the right place for cross-cutting concerns: content
//! negotiation, circuit breaking, header propagation, per-request tracing.
//!
//! # Ordering
//!
//! A list of middleware is applied so that the first entry runs outermost:
//!
//! ```text
//! wrap(h, &[a, b, c])  ==  a(b(c(h)))
//!
//! request  ─► a ─► b ─► c ─► h
//! response ◄─ a ◄─ b ◄─ c ◄─ h
//! ```
//!
//! The router resolves every route's list as global, then group, then
//! per-route middleware, so the global chain observes every request.
//!
//! Built-in middleware:
//! - [`accept`] / [`accept_json`]: 406 for unacceptable `Accept` headers
//! - [`breaker`]: circuit breaking, 503 while open
//! - [`forward_headers`]: captures trace-propagation headers for outgoing calls
//! - [`trace`]: per-request span with method, path, status and latency

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::handler::RawHandler;
use crate::request::Request;
use crate::response::Response;

mod accept;
mod breaker;
mod forward;
mod trace;

pub use accept::{accept, accept_json};
pub use breaker::{
    BreakerValidator, CircuitBreaker, ConsecutiveFailures, breaker, default_breaker_validator,
};
pub use forward::{DEFAULT_FORWARDED_HEADERS, ForwardedHeaders, forward_headers, forward_headers_with};
pub use trace::trace;

/// A handler transformer: `next` in, wrapped handler out.
///
/// Cloning is cheap. The same `Middleware` can be attached to many routes.
#[derive(Clone)]
pub struct Middleware {
    name: &'static str,
    layer: Arc<dyn Fn(RawHandler) -> RawHandler + Send + Sync + 'static>,
}

impl Middleware {
    /// Builds a middleware from a function over the next handler.
    ///
    /// `name` only shows up in diagnostics such as
    /// [`Router::routes`](crate::Router::routes).
    pub fn new<F>(name: &'static str, layer: F) -> Self
    where
        F: Fn(RawHandler) -> RawHandler + Send + Sync + 'static,
    {
        Self { name, layer: Arc::new(layer) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wraps `next`.
    pub fn apply(&self, next: RawHandler) -> RawHandler {
        (self.layer)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Builds a middleware from an async function that receives the request and
/// the next handler.
///
/// ```rust
/// use plumb::middleware::{self, Middleware};
///
/// let server_header: Middleware = middleware::from_fn("server_header", |req, next| async move {
///     let mut res = next.call(req).await;
///     res.headers_mut().insert("server", http::HeaderValue::from_static("plumb"));
///     res
/// });
/// ```
pub fn from_fn<F, Fut>(name: &'static str, f: F) -> Middleware
where
    F: Fn(Request, RawHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Middleware::new(name, move |next| {
        let f = Arc::clone(&f);
        RawHandler::from_fn(move |req| f(req, next.clone()))
    })
}

/// Applies `chain` around `handler`, first entry outermost.
pub fn wrap(handler: RawHandler, chain: &[Middleware]) -> RawHandler {
    chain.iter().rev().fold(handler, |next, mw| mw.apply(next))
}
