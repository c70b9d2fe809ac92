//! Circuit breaking.
//!
//! # States of [`ConsecutiveFailures`]
//! ```text
//! Closed → Open: `threshold` consecutive failures
//! Open → Half-Open: after `cooldown`
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! Only one probe is let through while half-open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use parking_lot::Mutex;
use tracing::warn;

use super::{Middleware, from_fn};
use crate::response::Response;

/// Decides whether a request may proceed and learns from its outcome.
pub trait CircuitBreaker: Send + Sync + 'static {
    /// Whether the request may proceed.
    fn allow(&self) -> bool;
    fn success(&self);
    fn failure(&self);
}

impl<T: CircuitBreaker> CircuitBreaker for Arc<T> {
    fn allow(&self) -> bool { (**self).allow() }
    fn success(&self) { (**self).success() }
    fn failure(&self) { (**self).failure() }
}

/// Classifies a response status as success (`true`) or failure.
pub type BreakerValidator = fn(StatusCode) -> bool;

/// Anything below 500 is a success from the server's point of view.
pub fn default_breaker_validator(status: StatusCode) -> bool {
    status.as_u16() < 500
}

/// Guards the wrapped handler with `cb`.
///
/// While `cb` refuses requests they are answered with `503 Service
/// Unavailable` without reaching the handler. Otherwise the handler's status is
/// classified by `validator` and reported back to `cb`.
pub fn breaker<B: CircuitBreaker>(cb: B, validator: BreakerValidator) -> Middleware {
    let cb = Arc::new(cb);
    from_fn("breaker", move |req, next| {
        let cb = Arc::clone(&cb);
        async move {
            if !cb.allow() {
                return Response::status(StatusCode::SERVICE_UNAVAILABLE);
            }

            let outcome = Outcome { cb, reported: false };
            let res = next.call(req).await;
            outcome.report(validator(res.status_code()));
            res
        }
    })
}

/// Reports the outcome of an admitted request exactly once. A request whose
/// future is dropped first (client gone, write timeout) counts as a failure.
struct Outcome<B: CircuitBreaker> {
    cb: Arc<B>,
    reported: bool,
}

impl<B: CircuitBreaker> Outcome<B> {
    fn report(mut self, ok: bool) {
        self.reported = true;
        if ok {
            self.cb.success();
        } else {
            self.cb.failure();
        }
    }
}

impl<B: CircuitBreaker> Drop for Outcome<B> {
    fn drop(&mut self) {
        if !self.reported {
            self.cb.failure();
        }
    }
}

#[derive(Debug)]
enum State {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { probing: bool },
}

/// Opens after `threshold` consecutive failures, probes again after `cooldown`.
#[derive(Debug)]
pub struct ConsecutiveFailures {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

impl ConsecutiveFailures {
    /// A `threshold` of zero is treated as one.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open { .. })
    }

    fn trip(&self, state: &mut State) {
        warn!(cooldown = ?self.cooldown, "circuit opened");
        *state = State::Open { until: Instant::now() + self.cooldown };
    }
}

impl CircuitBreaker for ConsecutiveFailures {
    fn allow(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => true,
            State::Open { until } if Instant::now() >= until => {
                *state = State::HalfOpen { probing: true };
                true
            }
            State::Open { .. } => false,
            State::HalfOpen { ref mut probing } => !std::mem::replace(probing, true),
        }
    }

    fn success(&self) {
        *self.state.lock() = State::Closed { failures: 0 };
    }

    fn failure(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { failures } if failures + 1 < self.threshold => {
                *state = State::Closed { failures: failures + 1 };
            }
            State::Closed { .. } | State::HalfOpen { .. } => self.trip(&mut state),
            State::Open { .. } => {}
        }
    }
}
