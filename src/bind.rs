//! Request body binding.
//!
//! [`bind`] reads the whole body, decodes it according to `Content-Type`
//! and validates the result with [`validator`]. [`decode`] does the same
//! without validation, for destination types that carry no constraints
//! (sequences, maps, foreign types).
//!
//! Every failure is a declared [`Error`], so a handler can return it with `?`
//! and the client gets the status below:
//!
//! | Failure | Status |
//! |---|---|
//! | `Content-Type` present but not JSON | 415 |
//! | body unreadable or empty | 400 |
//! | malformed JSON / wrong field types | 400 |
//! | validation rule violated | 422 |

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use validator::Validate;

use crate::error::Error;
use crate::request::Request;

const APPLICATION_JSON: &[u8] = b"application/json";

/// Decodes the request body into `T`, then runs `T`'s validation rules.
///
/// ```rust
/// use plumb::{Error, Request, bind};
/// use serde::Deserialize;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct NewUser {
///     #[validate(length(min = 1))]
///     name: String,
/// }
///
/// async fn create_user(mut req: Request) -> Result<&'static str, Error> {
///     let user: NewUser = bind(&mut req).await?;
///     # let _ = user.name;
///     Ok("created")
/// }
/// ```
pub async fn bind<T>(req: &mut Request) -> Result<T, Error>
where
    T: DeserializeOwned + Validate,
{
    let value: T = decode(req).await?;
    validate(&value)?;
    Ok(value)
}

/// Decodes the request body into `T` without validating it.
///
/// A missing `Content-Type` is treated as JSON. Any other unsupported type is
/// rejected before the body is read.
pub async fn decode<T>(req: &mut Request) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    if let Some(ct) = req.headers().get(CONTENT_TYPE) {
        if !is_json(ct.as_bytes()) {
            return Err(Error::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported media type: {}", String::from_utf8_lossy(ct.as_bytes())),
            ));
        }
    }

    let body = read_body(req).await?;
    decode_json(&body)
}

fn is_json(content_type: &[u8]) -> bool {
    content_type.is_empty()
        || content_type
            .get(..APPLICATION_JSON.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(APPLICATION_JSON))
}

async fn read_body(req: &mut Request) -> Result<Bytes, Error> {
    let body = req.take_body().collect().await.map_err(|e| {
        Error::new(StatusCode::BAD_REQUEST, format!("failed to read request body: {e}"))
    })?;

    if body.is_empty() {
        return Err(Error::new(StatusCode::BAD_REQUEST, "request body is empty"));
    }
    Ok(body)
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    let de = &mut serde_json::Deserializer::from_slice(body);

    let value = serde_path_to_error::deserialize(&mut *de)
        .map_err(|e| {
            let field = e.path().to_string();
            json_error(body, &field, e.into_inner())
        })?;

    // Trailing data after the value.
    de.end().map_err(|e| json_error(body, ".", e))?;

    Ok(value)
}

fn json_error(body: &[u8], field: &str, err: serde_json::Error) -> Error {
    let offset = byte_offset(body, err.line(), err.column());
    let message = strip_position(&err);

    let message = match err.classify() {
        Category::Data => format!("unmarshal type error: field={field}, offset={offset}, error={message}"),
        Category::Syntax | Category::Eof => format!("syntax error: offset={offset}, error={message}"),
        Category::Io => message,
    };
    Error::new(StatusCode::BAD_REQUEST, message)
}

/// serde_json reports 1-based line and column. Turn them into a byte offset
/// into `body`.
fn byte_offset(body: &[u8], line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = body
        .split(|b| *b == b'\n')
        .take(line - 1)
        .map(|l| l.len() + 1)
        .sum();
    (line_start + column).min(body.len())
}

/// `"expected value at line 1 column 2"` -> `"expected value"`.
fn strip_position(err: &serde_json::Error) -> String {
    let message = err.to_string();
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_owned(),
        None => message,
    }
}

fn validate<T: Validate>(value: &T) -> Result<(), Error> {
    let Err(errors) = value.validate() else {
        return Ok(());
    };

    let mut fields: Vec<&str> = errors.errors().keys().map(|k| k.as_ref()).collect();
    fields.sort_unstable();

    Err(Error::new(
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("validation_error: invalid fields: {}", fields.join(",")),
    ))
}
