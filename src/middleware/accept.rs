//! Content negotiation on the `Accept` header.

use std::sync::Arc;

use http::StatusCode;
use http::header::ACCEPT;
use regex::Regex;

use super::{Middleware, from_fn};
use crate::response::Response;

const ALL_MEDIA_TYPES: &str = "*/*";

enum MediaPattern {
    Exact(&'static str),
    Regex(Regex),
}

impl MediaPattern {
    fn matches(&self, media_type: &str) -> bool {
        match self {
            Self::Exact(expected) => media_type == *expected,
            Self::Regex(re) => re.is_match(media_type),
        }
    }
}

/// Rejects requests with `406 Not Acceptable` unless the client accepts one of
/// the media types matched by `patterns`.
///
/// Patterns are regular expressions, matched unanchored against each media
/// type of the `Accept` header (lowercased, parameters dropped). A missing or
/// empty header, or one listing `*/*`, is always acceptable.
///
/// ```rust
/// let mw = plumb::middleware::accept(["^.+/json", "image/"]).unwrap();
/// ```
pub fn accept<I, S>(patterns: I) -> Result<Middleware, regex::Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let patterns = patterns
        .into_iter()
        .map(|p| Regex::new(p.as_ref()).map(MediaPattern::Regex))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(negotiate(patterns))
}

/// Accepts `application/json` (or anything, per the `*/*` and empty-header
/// rules of [`accept`]).
pub fn accept_json() -> Middleware {
    negotiate(vec![MediaPattern::Exact("application/json")])
}

fn negotiate(patterns: Vec<MediaPattern>) -> Middleware {
    let patterns = Arc::new(patterns);
    from_fn("accept", move |req, next| {
        let acceptable = match req.headers().get(ACCEPT) {
            None => true,
            Some(value) => value.to_str().is_ok_and(|header| is_acceptable(header, &patterns)),
        };
        async move {
            if !acceptable {
                return Response::status(StatusCode::NOT_ACCEPTABLE);
            }
            next.call(req).await
        }
    })
}

fn is_acceptable(header: &str, patterns: &[MediaPattern]) -> bool {
    let header = header.trim();
    if header.is_empty() || header == ALL_MEDIA_TYPES {
        return true;
    }

    let accepted = parse_accept(header);
    if accepted.iter().any(|m| m == ALL_MEDIA_TYPES) {
        return true;
    }

    accepted.iter().any(|m| patterns.iter().any(|p| p.matches(m)))
}

/// Media types listed in an `Accept` header. Unparsable entries are skipped.
fn parse_accept(header: &str) -> Vec<String> {
    header
        .split(',')
        .filter_map(|entry| entry.trim().parse::<mime::Mime>().ok())
        .map(|m| m.essence_str().to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RawHandler;
    use crate::middleware::wrap;
    use crate::request::Request;

    async fn status_for(mw: &Middleware, accept: Option<&str>) -> StatusCode {
        let ok = RawHandler::from_fn(|_req| async { Response::status(StatusCode::OK) });
        let mut builder = http::Request::get("/");
        if let Some(accept) = accept {
            builder = builder.header(ACCEPT, accept);
        }
        let req: Request = builder.body(String::new()).unwrap().into();
        wrap(ok, std::slice::from_ref(mw)).call(req).await.status_code()
    }

    #[tokio::test]
    async fn patterns_match_listed_media_types() {
        let mw = accept(["^.+/json", "image/*"]).unwrap();
        let cases = [
            (Some("application/json"), StatusCode::OK),
            (Some("application/json+aws"), StatusCode::OK),
            (Some("image/jpeg"), StatusCode::OK),
            (Some("application/json;q=0.9"), StatusCode::OK),
            (Some("text/html, application/json;q=0.8"), StatusCode::OK),
            (Some("application/xml"), StatusCode::NOT_ACCEPTABLE),
            (Some("*/*"), StatusCode::OK),
            (Some("text/html, */*;q=0.1"), StatusCode::OK),
            (Some(""), StatusCode::OK),
            (None, StatusCode::OK),
        ];
        for (header, expected) in cases {
            assert_eq!(status_for(&mw, header).await, expected, "{header:?}");
        }
    }

    #[tokio::test]
    async fn accept_json_is_exact() {
        let mw = accept_json();
        assert_eq!(status_for(&mw, Some("application/json")).await, StatusCode::OK);
        assert_eq!(status_for(&mw, Some("Application/JSON; charset=utf-8")).await, StatusCode::OK);
        assert_eq!(status_for(&mw, Some("application/json+aws")).await, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(status_for(&mw, Some("application/xml")).await, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(status_for(&mw, Some("*/*")).await, StatusCode::OK);
    }

    #[test]
    fn invalid_patterns_are_reported() {
        assert!(accept(["("]).is_err());
    }
}
