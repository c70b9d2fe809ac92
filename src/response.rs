//! Outgoing HTTP response type, the [`IntoResponse`] conversion trait, and the
//! JSON responder.
//!
//! Handlers usually return something that implements [`IntoResponse`]: a
//! [`Json`] value, a string, a status code, or a hand-built [`Response`].
//! The `respond_*` functions are the responder proper. They decide whether a
//! body is written at all and set `Content-Type` before the status goes out.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Error;

const APPLICATION_JSON: &str = "application/json";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use plumb::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body and no `Content-Type`.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Converts into the `http` representation hyper writes to the wire.
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`. Terminated by a
/// typed body method, so the content type is always deliberate.
#[derive(Debug)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.finish(APPLICATION_JSON, body.into())
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(TEXT_PLAIN, Bytes::from(body.into()))
    }

    /// Terminate with no body (e.g. `204 No Content`, `301 Moved Permanently`).
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Bytes::new() }
    }

    fn finish(mut self, content_type: &'static str, body: Bytes) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Response { status: self.status, headers: self.headers, body }
    }
}

// ── Responder ─────────────────────────────────────────────────────────────────

/// Serialises `value` as a JSON response with status `code`.
///
/// `204 No Content`, or a value that serialises to `null` (`None`, `()`),
/// produces a header-only response without `Content-Type`.
pub fn respond_json<T: Serialize + ?Sized>(code: StatusCode, value: &T) -> Result<Response, Error> {
    if code == StatusCode::NO_CONTENT {
        return Ok(Response::status(code));
    }

    let bytes = serde_json::to_vec(value).map_err(|e| {
        Error::new(StatusCode::INTERNAL_SERVER_ERROR, format!("encoding response: {e}"))
    })?;

    if bytes == b"null" {
        return Ok(Response::status(code));
    }

    Ok(Response::builder().status(code).json(bytes))
}

/// Writes already-encoded JSON bytes verbatim. An empty slice counts as absent.
pub fn respond_bytes(code: StatusCode, bytes: impl Into<Bytes>) -> Response {
    let bytes = bytes.into();
    if code == StatusCode::NO_CONTENT || bytes.is_empty() {
        return Response::status(code);
    }
    Response::builder().status(code).json(bytes)
}

/// Drains `reader` completely, then writes its content as the JSON body.
///
/// Nothing is produced until the stream has been read to the end, so a read
/// failure never leaves a half-written response behind.
pub async fn respond_reader<R>(code: StatusCode, mut reader: R) -> Result<Response, Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.map_err(|e| {
        Error::new(StatusCode::INTERNAL_SERVER_ERROR, format!("reading response body: {e}"))
    })?;
    Ok(respond_bytes(code, buf))
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `Ok(StatusCode::ACCEPTED)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

/// A handler that wrote nothing answers `200 OK` with an empty body.
impl IntoResponse for () {
    fn into_response(self) -> Response { Response::status(StatusCode::OK) }
}

/// A serialisable value sent as `200 OK` JSON.
///
/// ```rust
/// use plumb::{Error, Json, Request};
///
/// #[derive(serde::Serialize)]
/// struct User { id: u64 }
///
/// async fn get_user(_req: Request) -> Result<Json<User>, Error> {
///     Ok(Json(User { id: 1 }))
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, self).into_response()
    }
}

/// `(StatusCode::CREATED, Json(user))` sets the status of a JSON response.
impl<T: Serialize> IntoResponse for (StatusCode, Json<T>) {
    fn into_response(self) -> Response {
        let (code, Json(value)) = self;
        match respond_json(code, &value) {
            Ok(res) => res,
            Err(err) => error_response(&err),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response { error_response(&self) }
}

/// Last-resort JSON rendering of a declared error. Serialising a struct of
/// two strings cannot fail, but the fallback keeps this path panic-free.
pub(crate) fn error_response(err: &Error) -> Response {
    match respond_json(err.status(), err) {
        Ok(res) => res,
        Err(_) => Response::status(err.status()),
    }
}
