//! Per-request tracing span.

use std::time::Instant;

use tracing::field::Empty;
use tracing::{Instrument, info, info_span};

use super::{Middleware, from_fn};

/// Opens a `request` span per request (method, path) and logs the status and
/// latency once the response is ready.
///
/// Mount it as global middleware so error notifications from the router land
/// inside the request span.
pub fn trace() -> Middleware {
    from_fn("trace", |req, next| {
        let span = info_span!(
            "request",
            method = %req.method(),
            path = %req.path(),
            status = Empty,
            latency_ms = Empty,
        );

        async move {
            let start = Instant::now();
            let res = next.call(req).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let span = tracing::Span::current();
            span.record("status", res.status_code().as_u16());
            span.record("latency_ms", latency_ms);
            info!(status = res.status_code().as_u16(), latency_ms, "request completed");
            res
        }
        .instrument(span)
    })
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::handler::RawHandler;
    use crate::middleware::wrap;
    use crate::request::Request;
    use crate::response::Response;

    #[tokio::test]
    async fn passes_the_response_through() {
        let handler = RawHandler::from_fn(|_req| async { Response::status(StatusCode::CREATED) });
        let res = wrap(handler, &[trace()]).call(Request::default()).await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
    }
}
