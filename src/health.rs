//! Health-check and diagnostic handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/liveness` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readiness` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Neither is mounted unless configured:
//!
//! ```rust
//! use plumb::{Config, Router, health};
//!
//! let router = Router::new(
//!     Config::default()
//!         .with_liveness(health::liveness())
//!         .with_readiness(health::readiness_check(|| async { dependencies_are_healthy().await })),
//! );
//!
//! async fn dependencies_are_healthy() -> bool { true }
//! ```
//!
//! Probes are mounted outside the global middleware chain, so an
//! authentication or content-negotiation layer never fails them.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use serde::Serialize;

use crate::handler::RawHandler;
use crate::response::{IntoResponse, Response, respond_json};

/// Always `200 OK` with body `"ok"`. If the process can answer HTTP at all, it
/// is alive.
pub fn liveness() -> RawHandler {
    RawHandler::from_fn(|_req| async { Response::text("ok") })
}

/// Always `200 OK` with body `"ready"`.
pub fn readiness() -> RawHandler {
    RawHandler::from_fn(|_req| async { Response::text("ready") })
}

/// `200 OK` while `check` resolves to `true`, `503 Service Unavailable`
/// otherwise.
pub fn readiness_check<F, Fut>(check: F) -> RawHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let check = Arc::new(check);
    RawHandler::from_fn(move |_req| {
        let ready = check();
        async move {
            if ready.await {
                Response::text("ready")
            } else {
                Response::status(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    })
}

// ── Profiler ──────────────────────────────────────────────────────────────────

pub(crate) const DEBUG_INDEX: &str = "/debug";
pub(crate) const DEBUG_VARS: &str = "/debug/vars";

#[derive(Serialize)]
struct Index {
    endpoints: [&'static str; 1],
}

#[derive(Serialize)]
struct Vars {
    version: &'static str,
    uptime_secs: u64,
    runtime: Option<RuntimeVars>,
}

#[derive(Serialize)]
struct RuntimeVars {
    workers: usize,
    alive_tasks: usize,
}

pub(crate) fn debug_index() -> RawHandler {
    RawHandler::from_fn(|_req| async {
        json_or_500(&Index { endpoints: [DEBUG_VARS] })
    })
}

/// Process and runtime counters, read at request time.
pub(crate) fn debug_vars(started: Instant) -> RawHandler {
    RawHandler::from_fn(move |_req| async move {
        let runtime = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let metrics = handle.metrics();
            RuntimeVars { workers: metrics.num_workers(), alive_tasks: metrics.num_alive_tasks() }
        });

        json_or_500(&Vars {
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: started.elapsed().as_secs(),
            runtime,
        })
    })
}

fn json_or_500<T: Serialize>(value: &T) -> Response {
    respond_json(StatusCode::OK, value).unwrap_or_else(|err| err.into_response())
}
