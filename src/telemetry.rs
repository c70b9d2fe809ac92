//! Error notification.
//!
//! The router reports notified failures through the [`Notifier`] trait and
//! nothing else. The default implementation, [`TracingNotifier`], records
//! them as `tracing` events on whatever span is current, so whichever
//! subscriber the application installs decides where they end up.

use http::{StatusCode, Uri};
use tracing::{Span, error};

use crate::error::DynError;
use crate::params::UriParams;

/// A failed request that was flagged for notification.
#[derive(Clone, Copy, Debug)]
pub struct ErrorEvent<'a> {
    pub uri: &'a Uri,
    pub status: StatusCode,
    /// `None` when the request did not go through the route table.
    pub params: Option<&'a UriParams>,
    pub error: &'a DynError,
}

/// Receives failures that the [`ErrorMapper`](crate::ErrorMapper) flagged
/// for notification.
///
/// Called inline on the request task, after the error has been mapped and
/// before the response is written.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, event: &ErrorEvent<'_>);
}

/// Records one `error` event and one `param` event per path parameter on the
/// current span.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &ErrorEvent<'_>) {
        let span = Span::current();

        error!(
            parent: &span,
            uri = %event.uri,
            status = event.status.as_u16(),
            error = %event.error,
            "error"
        );

        for (name, value) in event.params.into_iter().flat_map(UriParams::iter) {
            error!(parent: &span, name, value, "param");
        }
    }
}
