//! Path-prefixed route groups.

use http::Method;

use crate::error::RouteError;
use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::router::{ANY_METHODS, Router, join, verb_shortcuts};

/// A path prefix and a middleware list over a [`Router`].
///
/// Routes registered through a group are stored in the router like any other.
/// Their chain is the router's global middleware, then the group's (ancestors
/// first), then the route's own:
///
/// ```rust
/// use plumb::{Error, Request, Router, middleware};
///
/// async fn list(_req: Request) -> Result<&'static str, Error> { Ok("[]") }
///
/// # fn main() -> Result<(), plumb::RouteError> {
/// let mut router = Router::default();
/// let mut api = router.group("/api", &[middleware::accept_json()])?;
/// let mut v1 = api.group("/v1", &[middleware::trace()])?;
/// v1.get("/users", list, &[])?; // GET /api/v1/users: accept_json ∘ trace ∘ list
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RouteGroup<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<Middleware>,
}

impl<'r> RouteGroup<'r> {
    pub(crate) fn new(router: &'r mut Router, prefix: String, middleware: Vec<Middleware>) -> Self {
        Self { router, prefix, middleware }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// A child group under this group's prefix. Its middleware runs inside
    /// this group's.
    pub fn group(&mut self, prefix: &str, mw: &[Middleware]) -> Result<RouteGroup<'_>, RouteError> {
        let prefix = join(&self.prefix, prefix)?;
        let middleware = self.middleware.iter().chain(mw).cloned().collect();
        Ok(RouteGroup::new(&mut *self.router, prefix, middleware))
    }

    /// See [`Router::method`]. `pattern` is joined to the group prefix.
    pub fn method(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        mw: &[Middleware],
    ) -> Result<&mut Self, RouteError> {
        let pattern = join(&self.prefix, pattern)?;
        self.router.add(&[method], &pattern, handler.into_endpoint(), &self.middleware, mw)?;
        Ok(self)
    }

    verb_shortcuts! {
        get => GET,
        head => HEAD,
        options => OPTIONS,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        trace => TRACE,
    }

    /// See [`Router::any`].
    pub fn any(&mut self, pattern: &str, handler: impl Handler, mw: &[Middleware]) -> Result<&mut Self, RouteError> {
        let pattern = join(&self.prefix, pattern)?;
        self.router.add(&ANY_METHODS, &pattern, handler.into_endpoint(), &self.middleware, mw)?;
        Ok(self)
    }
}
