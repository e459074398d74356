//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Every handler is wrapped
//! in the instrumentation layer as it is registered, so there is no way to
//! add a route that skips tracing or the completion log.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use matchit::Router as MatchitRouter;

use crate::failure;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::trace::{Instrumented, ROOT};
use crate::middleware::{cors, recover};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    fallback: Option<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), fallback: None }
    }

    /// Register a handler for a method + pattern pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use tsu::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn delete_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::DELETE, "/users/{id}", delete_user)
    ///     .on(Method::GET,    "/users/{id}", get_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid route or conflicts with one
    /// already registered for `method`. Routes are fixed at startup.
    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        let handler = Instrumented::wrap(pattern, handler.into_boxed_handler());
        self.routes
            .entry(method)
            .or_default()
            .insert(pattern, handler)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    /// Handles every request no route matches, for any method. It is
    /// reported under the root route, with the literal path recorded.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(Instrumented::wrap(ROOT, handler.into_boxed_handler()));
        self
    }

    /// Runs one request through the full pipeline: CORS gate, fault
    /// boundary, routing and the instrumented handler.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        if let Some(preflight) = cors::preflight(req.method(), req.headers()) {
            return preflight.into_inner();
        }

        let (method, uri) = (req.method().clone(), req.uri().clone());
        let mut response = recover::guard(method, uri, self.dispatch(req)).await;
        cors::allow_defaults(&mut response);
        response.into_inner()
    }

    async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let Some((handler, params)) = self.lookup(&parts.method, parts.uri.path()) else {
            return failure::NOT_FOUND.into_response();
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let e: Box<dyn StdError + Send + Sync> = e.into();
                tracing::warn!(error = %e, path = parts.uri.path(), "failed to read request body");
                return failure::INVALID_REQUEST.from_error(&*e).into_response();
            }
        };

        handler.call(Request::new(parts, body, params)).await
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(method).and_then(|tree| tree.at(path).ok());
        match matched {
            Some(matched) => {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                Some((Arc::clone(matched.value), params))
            }
            None => self.fallback.as_ref().map(|h| (Arc::clone(h), HashMap::new())),
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
