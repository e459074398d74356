//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::trace::TraceParent;

/// An incoming HTTP request with its body already buffered.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) scope: Scope,
}

/// Per-request state bound by the instrumentation layer before the handler
/// runs. Owned by the request, never shared with other requests.
pub(crate) struct Scope {
    pub(crate) span: tracing::Span,
    pub(crate) trace: Option<TraceParent>,
}

impl Default for Scope {
    fn default() -> Self {
        Self { span: tracing::Span::none(), trace: None }
    }
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: Bytes,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
            scope: Scope::default(),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Header lookup. Values that are not visible ASCII read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// The request's logging span. Carries the method, route and trace ids;
    /// events emitted while the handler runs are recorded inside it.
    pub fn span(&self) -> &tracing::Span {
        &self.scope.span
    }

    /// The trace context resolved for this request.
    pub fn trace(&self) -> Option<&TraceParent> {
        self.scope.trace.as_ref()
    }
}

#[cfg(test)]
pub(crate) fn test_request(method: Method, uri: &str) -> Request {
    let (parts, ()) = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap()
        .into_parts();
    Request::new(parts, Bytes::new(), HashMap::new())
}
