//! Router configuration.

use std::fmt;
use std::sync::Arc;

use crate::handler::RawHandler;
use crate::mapper::ErrorMapper;
use crate::middleware::Middleware;
use crate::telemetry::{Notifier, TracingNotifier};

/// Collaborators of a [`Router`](crate::Router), fixed at construction.
///
/// Every option is optional. The default router answers unmatched requests
/// with a JSON 404, mounts no health or profiler endpoints, has no global
/// middleware, maps errors with
/// [`default_error_mapper`](crate::default_error_mapper) and notifies through
/// [`TracingNotifier`].
///
/// ```rust
/// use plumb::{Config, Router, health, middleware};
///
/// let config = Config::default()
///     .with_liveness(health::liveness())
///     .with_readiness(health::readiness())
///     .with_profiler(true)
///     .with_middleware(middleware::trace());
///
/// let router = Router::new(config);
/// ```
#[derive(Clone)]
pub struct Config {
    pub(crate) not_found: Option<RawHandler>,
    pub(crate) liveness: Option<RawHandler>,
    pub(crate) readiness: Option<RawHandler>,
    pub(crate) profiler: bool,
    pub(crate) middleware: Vec<Middleware>,
    pub(crate) error_mapper: ErrorMapper,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            not_found: None,
            liveness: None,
            readiness: None,
            profiler: false,
            middleware: Vec::new(),
            error_mapper: ErrorMapper::default(),
            notifier: Arc::new(TracingNotifier),
        }
    }
}

impl Config {
    /// Answers requests that match no route.
    pub fn with_not_found(mut self, handler: RawHandler) -> Self {
        self.not_found = Some(handler);
        self
    }

    /// Mounts `handler` at `GET /liveness`.
    pub fn with_liveness(mut self, handler: RawHandler) -> Self {
        self.liveness = Some(handler);
        self
    }

    /// Mounts `handler` at `GET /readiness`.
    pub fn with_readiness(mut self, handler: RawHandler) -> Self {
        self.readiness = Some(handler);
        self
    }

    /// Mounts the diagnostic endpoints under `/debug`.
    pub fn with_profiler(mut self, enabled: bool) -> Self {
        self.profiler = enabled;
        self
    }

    /// Appends a global middleware. The first one added runs outermost.
    pub fn with_middleware(mut self, mw: Middleware) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn with_error_mapper(mut self, mapper: ErrorMapper) -> Self {
        self.error_mapper = mapper;
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("not_found", &self.not_found.is_some())
            .field("liveness", &self.liveness.is_some())
            .field("readiness", &self.readiness.is_some())
            .field("profiler", &self.profiler)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}
