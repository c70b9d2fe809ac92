//! Radix-tree request router.
//!
//! One [`matchit`] tree per HTTP method. Every route is composed once, at
//! registration:
//!
//! ```text
//! global mw ∘ group mw ∘ route mw ∘ adapter(handler)
//! ```
//!
//! where the adapter turns the handler's `Err` into a JSON response through
//! the [`ErrorMapper`] and, when flagged, the [`Notifier`]. Serving a request
//! is a tree lookup, parameter injection, and one call into that chain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode, Uri};
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::config::Config;
use crate::error::{BoxError, DynError, Error, RouteError};
use crate::group::RouteGroup;
use crate::handler::{Endpoint, Handler, RawHandler};
use crate::health;
use crate::mapper::ErrorMapper;
use crate::middleware::{Middleware, wrap};
use crate::params::UriParams;
use crate::request::Request;
use crate::response::{IntoResponse, Response, respond_json};
use crate::telemetry::{ErrorEvent, Notifier};

/// Methods registered by [`Router::any`].
pub(crate) const ANY_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::TRACE,
    Method::CONNECT,
];

/// Generates the per-verb registration shortcuts over a `method` function.
macro_rules! verb_shortcuts {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            #[doc = concat!("Shortcut for `method(Method::", stringify!($method), ", ..)`.")]
            pub fn $name(
                &mut self,
                pattern: &str,
                handler: impl $crate::Handler,
                mw: &[$crate::middleware::Middleware],
            ) -> Result<&mut Self, $crate::RouteError> {
                self.method(http::Method::$method, pattern, handler, mw)
            }
        )*
    };
}
pub(crate) use verb_shortcuts;

/// A registered route, as reported by [`Router::routes`].
#[derive(Clone, Debug)]
pub struct Route {
    method: Method,
    pattern: String,
    handler: RawHandler,
    middleware: Vec<Middleware>,
}

impl Route {
    pub fn method(&self) -> &Method { &self.method }
    pub fn pattern(&self) -> &str { &self.pattern }

    /// The terminal handler, before any middleware.
    pub fn handler(&self) -> &RawHandler { &self.handler }

    /// The resolved chain, outermost first: global, then group, then route.
    pub fn middleware(&self) -> &[Middleware] { &self.middleware }
}

/// The application router.
///
/// Build it once at startup, then hand it to a [`Runner`](crate::Runner).
/// Registration errors (malformed or conflicting patterns) are returned
/// immediately, never at request time.
///
/// ```rust
/// use http::StatusCode;
/// use plumb::{Config, Error, Json, Request, Router};
///
/// async fn get_user(req: Request) -> Result<Json<u64>, Error> {
///     let id = req.params().map_or(Ok(0), |p| p.uint("id"))?;
///     Ok(Json(id))
/// }
///
/// async fn create_user(_req: Request) -> Result<StatusCode, Error> {
///     Ok(StatusCode::CREATED)
/// }
///
/// # fn main() -> Result<(), plumb::RouteError> {
/// let mut router = Router::new(Config::default());
/// router
///     .get("/users/{id}", get_user, &[])?
///     .post("/users", create_user, &[])?;
/// # Ok(())
/// # }
/// ```
pub struct Router {
    trees: HashMap<Method, MatchitRouter<RawHandler>>,
    routes: Vec<Route>,
    middleware: Vec<Middleware>,
    failures: Failures,
    fallback: RawHandler,
}

impl Router {
    /// Builds a router and mounts the endpoints `config` asks for.
    pub fn new(config: Config) -> Self {
        let Config { not_found, liveness, readiness, profiler, middleware, error_mapper, notifier } = config;

        let not_found = not_found.unwrap_or_else(default_not_found);
        let fallback = wrap(method_not_allowed_or(not_found), &middleware);

        let mut router = Self {
            trees: HashMap::new(),
            routes: Vec::new(),
            middleware,
            failures: Failures { mapper: error_mapper, notifier },
            fallback,
        };

        if let Some(handler) = liveness {
            router.mount("/liveness", handler);
        }
        if let Some(handler) = readiness {
            router.mount("/readiness", handler);
        }
        if profiler {
            router.mount(health::DEBUG_INDEX, health::debug_index());
            router.mount(health::DEBUG_VARS, health::debug_vars(Instant::now()));
        }
        router
    }

    /// Registers `handler` for `method` requests on `pattern`, wrapped by `mw`
    /// and then by the global middleware.
    ///
    /// Path variables use `{name}` syntax, a trailing catch-all `{*rest}`.
    /// Within `mw` the first entry runs outermost.
    pub fn method(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Handler,
        mw: &[Middleware],
    ) -> Result<&mut Self, RouteError> {
        let pattern = normalize(pattern)?;
        self.add(&[method], &pattern, handler.into_endpoint(), &[], mw)?;
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

    /// Registers `handler` for every supported method on `pattern`.
    pub fn any(&mut self, pattern: &str, handler: impl Handler, mw: &[Middleware]) -> Result<&mut Self, RouteError> {
        let pattern = normalize(pattern)?;
        self.add(&ANY_METHODS, &pattern, handler.into_endpoint(), &[], mw)?;
        Ok(self)
    }

    /// Opens a group of routes under `prefix` whose middleware runs inside the
    /// global chain and outside each route's own.
    pub fn group(&mut self, prefix: &str, mw: &[Middleware]) -> Result<RouteGroup<'_>, RouteError> {
        let prefix = normalize(prefix)?;
        Ok(RouteGroup::new(self, prefix, mw.to_vec()))
    }

    /// Every registered route in registration order, one entry per method.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatches one request.
    ///
    /// Never fails: unmatched requests get 404 (or 405 with `Allow` when the
    /// path exists under other methods), handler errors get their mapped
    /// response, panics become notified 500s.
    pub async fn serve(&self, mut req: Request) -> Response {
        let matched = self
            .trees
            .get(req.method())
            .and_then(|tree| tree.at(req.path()).ok())
            .map(|m| (m.value.clone(), m.params.iter().collect::<UriParams>()));

        let handler = match matched {
            Some((handler, params)) => {
                req.set_params(params);
                handler
            }
            None => {
                if let Some(allow) = self.allowed_methods(req.method(), req.path()) {
                    req.extensions_mut().insert(allow);
                }
                self.fallback.clone()
            }
        };

        let uri = req.uri().clone();
        let params = req.shared_params();
        match AssertUnwindSafe(async move { handler.call(req).await }).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => {
                let err = Panicked::from_payload(panic.as_ref());
                self.failures.respond(&uri, params.as_deref(), &err)
            }
        }
    }

    pub(crate) fn add(
        &mut self,
        methods: &[Method],
        pattern: &str,
        endpoint: Endpoint,
        group_mw: &[Middleware],
        route_mw: &[Middleware],
    ) -> Result<(), RouteError> {
        let chain: Vec<Middleware> = self
            .middleware
            .iter()
            .chain(group_mw)
            .chain(route_mw)
            .cloned()
            .collect();

        let terminal = self.failures.adapt(endpoint);
        let wrapped = wrap(terminal.clone(), &chain);

        // Insert into copies first so a conflict on any method leaves the
        // router untouched.
        let mut staged = Vec::with_capacity(methods.len());
        for method in methods {
            let mut tree = self.trees.get(method).cloned().unwrap_or_default();
            tree.insert(pattern, wrapped.clone())
                .map_err(|source| RouteError::Insert { pattern: pattern.to_owned(), source })?;
            staged.push((method, tree));
        }

        for (method, tree) in staged {
            self.trees.insert(method.clone(), tree);
            self.routes.push(Route {
                method: method.clone(),
                pattern: pattern.to_owned(),
                handler: terminal.clone(),
                middleware: chain.clone(),
            });
        }
        Ok(())
    }

    /// Built-in endpoints bypass the global middleware.
    fn mount(&mut self, path: &'static str, handler: RawHandler) {
        let inserted = self.trees.entry(Method::GET).or_default().insert(path, handler.clone());
        match inserted {
            Ok(()) => self.routes.push(Route {
                method: Method::GET,
                pattern: path.to_owned(),
                handler,
                middleware: Vec::new(),
            }),
            Err(e) => error!(path, error = %e, "could not mount built-in endpoint"),
        }
    }

    fn allowed_methods(&self, method: &Method, path: &str) -> Option<Allowed> {
        let mut allowed: Vec<&str> = self
            .trees
            .iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m.as_str())
            .collect();
        if allowed.is_empty() {
            return None;
        }
        allowed.sort_unstable();
        HeaderValue::try_from(allowed.join(", ")).ok().map(Allowed)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// Serves the router as a plain handler, e.g. for a [`Runner`](crate::Runner).
impl From<Router> for RawHandler {
    fn from(router: Router) -> Self {
        let router = Arc::new(router);
        RawHandler::from_fn(move |req| {
            let router = Arc::clone(&router);
            async move { router.serve(req).await }
        })
    }
}

// ── Error adaptation ──────────────────────────────────────────────────────────

/// The error policy shared by every route of one router.
#[derive(Clone)]
struct Failures {
    mapper: ErrorMapper,
    notifier: Arc<dyn Notifier>,
}

impl Failures {
    /// Turns a fallible endpoint into a handler that cannot fail.
    fn adapt(&self, endpoint: Endpoint) -> RawHandler {
        let failures = self.clone();
        RawHandler::from_fn(move |req: Request| {
            let endpoint = Arc::clone(&endpoint);
            let failures = failures.clone();
            async move {
                let uri = req.uri().clone();
                let params = req.shared_params();

                let outcome = AssertUnwindSafe(async move { endpoint.call(req).await })
                    .catch_unwind()
                    .await;

                let err: BoxError = match outcome {
                    Ok(Ok(res)) => return res,
                    Ok(Err(err)) => err,
                    Err(panic) => Box::new(Panicked::from_payload(panic.as_ref())),
                };
                failures.respond(&uri, params.as_deref(), err.as_ref())
            }
        })
    }

    fn respond(&self, uri: &Uri, params: Option<&UriParams>, err: &DynError) -> Response {
        let mapped = self.mapper.map(err);

        if mapped.notify {
            self.notifier.notify(&ErrorEvent { uri, status: mapped.status, params, error: err });
        }

        respond_json(mapped.status, &mapped.payload).unwrap_or_else(|err| err.into_response())
    }
}

/// A handler or middleware panicked. Follows the undeclared-error path.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Panicked(String);

impl Panicked {
    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_owned());
        Self(message)
    }
}

// ── Fallback ──────────────────────────────────────────────────────────────────

/// Methods the unmatched path is registered under, for a 405 `Allow` header.
#[derive(Clone)]
struct Allowed(HeaderValue);

fn method_not_allowed_or(not_found: RawHandler) -> RawHandler {
    RawHandler::from_fn(move |req: Request| {
        let allowed = req.extensions().get::<Allowed>().cloned();
        let not_found = not_found.clone();
        async move {
            match allowed {
                Some(Allowed(allow)) => {
                    let err = Error::new(
                        StatusCode::METHOD_NOT_ALLOWED,
                        format!("method {} not allowed on {}", req.method(), req.path()),
                    );
                    let mut res = err.into_response();
                    res.headers_mut().insert(ALLOW, allow);
                    res
                }
                None => not_found.call(req).await,
            }
        }
    })
}

fn default_not_found() -> RawHandler {
    RawHandler::from_fn(|req: Request| async move {
        Error::new(StatusCode::NOT_FOUND, format!("no route for {} {}", req.method(), req.path()))
            .into_response()
    })
}

// ── Patterns ──────────────────────────────────────────────────────────────────

/// Collapses repeated slashes and drops a trailing one.
///
/// `"/users//{id}/"` -> `"/users/{id}"`. Empty patterns, patterns without a
/// leading slash and `.`/`..` segments are rejected.
pub(crate) fn normalize(pattern: &str) -> Result<String, RouteError> {
    if pattern.is_empty() {
        return Err(RouteError::EmptyPattern);
    }
    if !pattern.starts_with('/') {
        return Err(malformed(pattern, "must start with '/'"));
    }

    let mut normalized = String::with_capacity(pattern.len());
    for segment in pattern.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(malformed(pattern, "dot segments are not allowed"));
        }
        normalized.push('/');
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Joins an already normalised `prefix` with `pattern`.
pub(crate) fn join(prefix: &str, pattern: &str) -> Result<String, RouteError> {
    let pattern = normalize(pattern)?;
    Ok(match (prefix, pattern.as_str()) {
        ("/", _) => pattern,
        (_, "/") => prefix.to_owned(),
        _ => format!("{prefix}{pattern}"),
    })
}

fn malformed(pattern: &str, reason: &'static str) -> RouteError {
    RouteError::Malformed { pattern: pattern.to_owned(), reason }
}
