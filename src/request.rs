//! Incoming HTTP request type.

use std::sync::Arc;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty};

use crate::error::BoxError;
use crate::params::UriParams;

/// A request body that has not been read yet.
///
/// Reading is left to whoever needs it (usually [`bind`](crate::bind)), so
/// a request that fails early never pays for the transfer.
pub struct Body(UnsyncBoxBody<Bytes, BoxError>);

impl Body {
    pub fn new<B>(body: B) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self(body.map_err(Into::into).boxed_unsync())
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// Reads the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, BoxError> {
        Ok(self.0.collect().await?.to_bytes())
    }
}

impl Default for Body {
    fn default() -> Self { Self::empty() }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Body")
    }
}

/// An incoming HTTP request.
///
/// Wraps the `http` request head and an unread [`Body`]. Path parameters
/// extracted by the router live in the request extensions, keyed by a type
/// only this crate can name, so they are per-request by construction.
#[derive(Debug)]
pub struct Request {
    head: http::request::Parts,
    body: Body,
}

/// `GET /` with no headers and an empty body.
impl Default for Request {
    fn default() -> Self {
        let (head, ()) = http::Request::new(()).into_parts();
        Self { head, body: Body::empty() }
    }
}

impl Request {
    pub fn from_parts(head: http::request::Parts, body: Body) -> Self {
        Self { head, body }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.head.headers }
    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }

    /// Header lookup by name (case-insensitive). Non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Takes the body out of the request, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// The path parameters of the matched route.
    ///
    /// `None` means the request was not dispatched by a [`Router`](crate::Router)
    /// (or matched no route). That is different from `Some` of an empty map,
    /// which is a matched route without parameters.
    pub fn params(&self) -> Option<&UriParams> {
        self.head.extensions.get::<ParamsSlot>().map(|slot| slot.0.as_ref())
    }

    pub(crate) fn shared_params(&self) -> Option<Arc<UriParams>> {
        self.head.extensions.get::<ParamsSlot>().map(|slot| Arc::clone(&slot.0))
    }

    /// Returns a single path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().and_then(|p| p.get(name))
    }

    /// Attaches `params`, replacing any previously attached map.
    pub fn with_params(mut self, params: UriParams) -> Self {
        self.set_params(params);
        self
    }

    pub(crate) fn set_params(&mut self, params: UriParams) {
        self.head.extensions.insert(ParamsSlot(Arc::new(params)));
    }

    /// Reassembles an `http::Request`, e.g. to hand it to another stack.
    pub fn into_http(self) -> http::Request<Body> {
        http::Request::from_parts(self.head, self.body)
    }
}

impl<B> From<http::Request<B>> for Request
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    fn from(req: http::Request<B>) -> Self {
        let (head, body) = req.into_parts();
        Self { head, body: Body::new(body) }
    }
}

/// Private extension key for path parameters.
#[derive(Clone)]
struct ParamsSlot(Arc<UriParams>);

#[cfg(test)]
mod tests {
    use super::*;

    fn request(body: &'static str) -> Request {
        http::Request::post("/users/42?x=1")
            .header("Content-Type", "application/json")
            .body(body.to_owned())
            .unwrap()
            .into()
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request("");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(req.header("accept"), None);
        assert_eq!(req.path(), "/users/42");
    }

    #[test]
    fn params_absent_is_distinct_from_empty() {
        let req = request("");
        assert!(req.params().is_none());

        let req = req.with_params(UriParams::default());
        assert!(req.params().is_some_and(UriParams::is_empty));
    }

    #[test]
    fn param_reads_from_attached_map() {
        let params: UriParams = [("id".to_owned(), "42".to_owned())].into_iter().collect();
        let req = request("").with_params(params);
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("name"), None);
    }

    #[tokio::test]
    async fn take_body_leaves_empty_body() {
        let mut req = request(r#"{"a":1}"#);
        assert_eq!(req.take_body().collect().await.unwrap(), Bytes::from_static(br#"{"a":1}"#));
        assert!(req.take_body().collect().await.unwrap().is_empty());
    }
}
