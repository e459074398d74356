//! Per-request tracing, timing and the completion log line.
//!
//! [`Router`](crate::Router) wraps every handler in [`Instrumented`] at
//! registration time. For each request it:
//!
//! 1. resolves the trace context (inbound `traceparent`, or a fresh one
//!    echoed back in `traceresponse`),
//! 2. binds a `request` span carrying method, route and trace ids into the
//!    [`Request`] and runs the handler inside it,
//! 3. times the handler and records the outcome in a [`Metrics`] record,
//! 4. emits exactly one `request completed` event.
//!
//! The event level follows the outcome: `ERROR` for 5xx, `WARN` for 4xx,
//! `DEBUG` for successful hits on the root route (health checks, catch-all
//! fallbacks) and `INFO` for everything else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use tracing::{Instrument, Level};

use crate::failure::Failure;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::{Request, Scope};
use crate::trace::{TRACEPARENT, TRACERESPONSE, TraceParent};

/// The root pattern. Hits on it log at `DEBUG` and record the literal path.
pub const ROOT: &str = "/";

/// Outcome of one request, read once when the completion event is emitted.
#[derive(Clone, Debug)]
pub struct Metrics {
    pub duration: Duration,
    pub status: StatusCode,
    /// The registration pattern, never the literal path.
    pub route: Arc<str>,
    /// The literal path, recorded only for the root route.
    pub path: Option<String>,
    pub failure: Option<Failure>,
}

impl Metrics {
    pub fn level(&self) -> Level {
        let status = self.status.as_u16();
        if status >= 500 {
            Level::ERROR
        } else if status >= 400 {
            Level::WARN
        } else if &*self.route == ROOT {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    fn emit(&self, method: &Method, trace: &TraceParent) {
        // `event!` needs the level at compile time.
        macro_rules! completed {
            ($level:expr) => {
                tracing::event!(
                    $level,
                    route = %self.route,
                    status = self.status.as_u16(),
                    duration_ms = self.duration.as_secs_f64() * 1000.0,
                    path = self.path.as_deref(),
                    method = %method,
                    trace.id = %trace.trace_id,
                    trace.span = %trace.parent_id,
                    error = self.failure.as_ref().map(Failure::code),
                    error_description = self.failure.as_ref().and_then(Failure::description),
                    "request completed"
                )
            };
        }

        let level = self.level();
        if level == Level::ERROR {
            completed!(Level::ERROR);
        } else if level == Level::WARN {
            completed!(Level::WARN);
        } else if level == Level::DEBUG {
            completed!(Level::DEBUG);
        } else {
            completed!(Level::INFO);
        }
    }
}

/// Instrumentation wrapper around a registered handler.
pub(crate) struct Instrumented {
    route: Arc<str>,
    inner: BoxedHandler,
}

impl Instrumented {
    pub(crate) fn wrap(route: &str, inner: BoxedHandler) -> BoxedHandler {
        Arc::new(Self { route: Arc::from(route), inner })
    }
}

impl ErasedHandler for Instrumented {
    fn call(&self, mut req: Request) -> BoxFuture {
        let route = Arc::clone(&self.route);
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            let (trace, generated) = TraceParent::resolve(req.header(TRACEPARENT));

            let span = tracing::info_span!(
                "request",
                method = %req.method(),
                route = %route,
                trace.id = %trace.trace_id,
                trace.span = %trace.parent_id
            );
            req.scope = Scope { span: span.clone(), trace: Some(trace) };

            let method = req.method().clone();
            let path = (&*route == ROOT).then(|| req.path().to_owned());

            let started = Instant::now();
            let mut response = inner.call(req).instrument(span).await;
            let duration = started.elapsed();

            if generated {
                response.set_header(TRACERESPONSE, trace.to_string());
            }

            let metrics = Metrics {
                duration,
                status: response.status,
                route,
                path,
                failure: response.failure.clone(),
            };
            metrics.emit(&method, &trace);

            response
        })
    }
}
