//! CORS preflight gate.
//!
//! Runs before routing. A preflight (`OPTIONS` with an `Origin`) is answered
//! here and never reaches a handler, so it produces no completion log.
//! Every other response gets permissive defaults unless the handler set
//! its own values.

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ORIGIN, VARY,
};
use http::{HeaderMap, Method, StatusCode};

use crate::response::Response;

const DEFAULT_METHODS: &str = "POST, GET, OPTIONS";

/// The preflight answer, or `None` when the request should be dispatched.
pub(crate) fn preflight(method: &Method, headers: &HeaderMap) -> Option<Response> {
    if method != Method::OPTIONS {
        return None;
    }
    let origin = headers.get(ORIGIN).filter(|v| !v.is_empty())?;
    // Any non-empty origin is reflected, including non-ASCII ones. UTF-8
    // survives unchanged; other bytes become U+FFFD.
    let origin = String::from_utf8_lossy(origin.as_bytes());

    Some(
        Response::builder()
            .status(StatusCode::OK)
            .header(ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), &origin)
            .header(ACCESS_CONTROL_ALLOW_METHODS.as_str(), "*")
            .header(ACCESS_CONTROL_ALLOW_HEADERS.as_str(), "*")
            .header(ACCESS_CONTROL_EXPOSE_HEADERS.as_str(), "*")
            .header(VARY.as_str(), "Origin")
            .no_body(),
    )
}

/// Defaults for dispatched requests.
pub(crate) fn allow_defaults(response: &mut Response) {
    response.default_header(ACCESS_CONTROL_ALLOW_METHODS.as_str(), DEFAULT_METHODS);
    response.default_header(ACCESS_CONTROL_ALLOW_ORIGIN.as_str(), "*");
}
