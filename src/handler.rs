//! Handler trait, the raw wire-level handler, and type erasure.
//!
//! # Two layers
//!
//! Application code writes *handlers*: async functions that take a
//! [`Request`] and return `Result<impl IntoResponse, impl Into<BoxError>>`.
//! They may fail. The router turns every handler into a [`RawHandler`],
//! which cannot fail: errors have already been mapped to a [`Response`].
//! Middleware only ever sees `RawHandler`s.
//!
//! ```text
//! async fn get_user(req: Request) -> Result<Json<User>, Error>   ← user writes this
//!        ↓ router.get("/users/{id}", get_user, &[])
//! get_user.into_endpoint()                                         ← Handler blanket impl
//!        ↓  Arc<dyn ErasedHandler>
//! router adapter: Err(e) → ErrorMapper → Response                 ← RawHandler
//!        ↓
//! middleware.apply(raw) …                                          ← RawHandler
//! ```
//!
//! The per-request cost is one `Arc` clone and one virtual call per layer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` so tokio can move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

// ── Handler ───────────────────────────────────────────────────────────────────

/// Internal dispatch interface for fallible handlers.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Result<Response, BoxError>>;
}

/// A type-erased fallible handler, shared across concurrent requests.
#[doc(hidden)]
pub type Endpoint = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function with
/// the shape:
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<BoxError>>
/// ```
///
/// Returning a [`crate::Error`] declares the status code. Any other error is
/// reported as a 500.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> Endpoint;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R, E> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn into_endpoint(self) -> Endpoint {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` into the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Result<Response, BoxError>> {
        let fut = (self.0)(req);
        Box::pin(async move {
            match fut.await {
                Ok(value) => Ok(value.into_response()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

// ── RawHandler ────────────────────────────────────────────────────────────────

/// The lowest-level handler form: a request in, a response out, no errors.
///
/// This is what middleware wraps and what the [`Runner`](crate::Runner)
/// serves. Cloning is one atomic increment.
#[derive(Clone)]
pub struct RawHandler(Arc<dyn Fn(Request) -> BoxFuture<Response> + Send + Sync + 'static>);

impl RawHandler {
    /// Wraps an async function or closure.
    ///
    /// ```rust
    /// use plumb::{RawHandler, Response};
    ///
    /// let ok = RawHandler::from_fn(|_req| async { Response::text("ok") });
    /// ```
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req| -> BoxFuture<Response> { Box::pin(f(req)) }))
    }

    pub fn call(&self, req: Request) -> BoxFuture<Response> {
        (self.0)(req)
    }
}

impl std::fmt::Debug for RawHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RawHandler")
    }
}
