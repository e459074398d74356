//! Client-facing failures.
//!
//! Every error response tsu sends has the same shape:
//!
//! ```json
//! {"error": "not_found", "status": 404, "error_description": "missing widget 7"}
//! ```
//!
//! Four templates cover the classifications clients are expected to act on.
//! Wrap lower-level errors with [`Failure::from_error`] to keep the
//! classification and carry the error's message as the description. Any
//! other error reaching [`write_failure`] becomes a `server_error`.
//!
//! The description is the source error's `Display` output, verbatim. Do
//! not wrap errors whose messages must not reach clients.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// `401 unauthorized`
pub const UNAUTHORIZED: Failure = Failure::template("unauthorized", StatusCode::UNAUTHORIZED);
/// `500 server_error`
pub const SERVER_ERROR: Failure = Failure::template("server_error", StatusCode::INTERNAL_SERVER_ERROR);
/// `400 invalid_request`
pub const INVALID_REQUEST: Failure = Failure::template("invalid_request", StatusCode::BAD_REQUEST);
/// `404 not_found`
pub const NOT_FOUND: Failure = Failure::template("not_found", StatusCode::NOT_FOUND);

/// A typed, client-safe error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Failure {
    #[serde(rename = "error")]
    code: Cow<'static, str>,
    #[serde(serialize_with = "as_u16")]
    status: StatusCode,
    #[serde(rename = "error_description", skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Failure {
    const fn template(code: &'static str, status: StatusCode) -> Self {
        Self { code: Cow::Borrowed(code), status, description: None }
    }

    /// A failure outside the four templates.
    pub fn new(code: impl Into<Cow<'static, str>>, status: StatusCode) -> Self {
        Self { code: code.into(), status, description: None }
    }

    /// Same code and status as `self`, described by `err`'s message.
    ///
    /// ```
    /// use tsu::failure::NOT_FOUND;
    ///
    /// let err = std::io::Error::other("missing widget 7");
    /// let f = NOT_FOUND.from_error(&err);
    /// assert_eq!(f.code(), "not_found");
    /// assert_eq!(f.description(), Some("missing widget 7"));
    /// ```
    pub fn from_error<E: fmt::Display + ?Sized>(&self, err: &E) -> Self {
        Self {
            code: self.code.clone(),
            status: self.status,
            description: Some(err.to_string()),
        }
    }

    pub fn code(&self) -> &str { &self.code }
    pub fn status(&self) -> StatusCode { self.status }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }

    /// Any error into a failure. The first failure found on the `source()`
    /// chain wins, so a failure wrapped by another error keeps its code.
    /// Anything else is a `server_error` described by the outer message.
    pub fn coerce(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        let err = err.into();
        let outer: &(dyn StdError + 'static) = &*err;
        std::iter::successors(Some(outer), |&e| e.source())
            .find_map(|e| e.downcast_ref::<Failure>())
            .cloned()
            .unwrap_or_else(|| SERVER_ERROR.from_error(outer))
    }

    pub(crate) fn to_response(&self, span: &tracing::Span) -> Response {
        let body = match serde_json::to_vec(self) {
            Ok(body) => body,
            Err(e) => {
                span.in_scope(|| tracing::warn!(error = %e, "failed to encode error response"));
                Vec::new()
            }
        };

        let mut response = Response::builder().status(self.status).json(body);
        response.failure = Some(self.clone());
        response
    }
}

/// The failure's code, matching what clients see in the `error` field.
impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

impl StdError for Failure {}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        self.to_response(&tracing::Span::current())
    }
}

fn as_u16<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

/// Builds the error response for `err` and records the failure for the
/// request's completion log.
///
/// ```
/// use tsu::{Request, Response, failure::{self, write_failure}};
///
/// async fn get_widget(req: Request) -> Response {
///     match req.param("id") {
///         Some("7") => Response::text("widget 7"),
///         _ => write_failure(&req, failure::NOT_FOUND),
///     }
/// }
/// ```
pub fn write_failure(req: &Request, err: impl Into<Box<dyn StdError + Send + Sync>>) -> Response {
    Failure::coerce(err).to_response(req.span())
}
