//! Trace-context propagation for outgoing calls.

use std::sync::Arc;

use http::HeaderMap;
use http::header::HeaderName;
use tracing::{Instrument, debug, info_span};

use super::{Middleware, from_fn};

/// W3C trace-context and baggage headers.
pub const DEFAULT_FORWARDED_HEADERS: [&str; 3] = ["traceparent", "tracestate", "baggage"];

/// Headers of the incoming request that outgoing requests made while handling
/// it should carry. Stored as a request extension by [`forward_headers`].
///
/// ```rust
/// use plumb::Request;
/// use plumb::middleware::ForwardedHeaders;
///
/// fn outgoing_headers(req: &Request) -> http::HeaderMap {
///     req.extensions()
///         .get::<ForwardedHeaders>()
///         .map(|f| f.headers().clone())
///         .unwrap_or_default()
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ForwardedHeaders(HeaderMap);

impl ForwardedHeaders {
    pub fn headers(&self) -> &HeaderMap {
        &self.0
    }
}

/// [`forward_headers_with`] over [`DEFAULT_FORWARDED_HEADERS`].
pub fn forward_headers() -> Middleware {
    forward_headers_with(DEFAULT_FORWARDED_HEADERS.map(HeaderName::from_static))
}

/// Copies the named headers, when present, into a [`ForwardedHeaders`]
/// extension. The rest of the chain runs inside a `header_forwarder` span.
pub fn forward_headers_with<I>(names: I) -> Middleware
where
    I: IntoIterator<Item = HeaderName>,
{
    let names: Arc<[HeaderName]> = names.into_iter().collect();
    from_fn("forward_headers", move |mut req, next| {
        let mut forwarded = HeaderMap::new();
        for name in names.iter() {
            for value in req.headers().get_all(name) {
                forwarded.append(name.clone(), value.clone());
            }
        }

        let span = info_span!("header_forwarder", forwarded = forwarded.len());
        req.extensions_mut().insert(ForwardedHeaders(forwarded));

        async move {
            debug!("header forwarder processing");
            next.call(req).await
        }
        .instrument(span)
    })
}
