use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame};
use serde_json::{Value, json};
use tracing_subscriber::fmt::MakeWriter;
use tsu::{Request, Response, Router, TraceParent, failure, write_failure, write_result};

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

// ── Log capture ───────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Captured {
    fn events(&self) -> Vec<Value> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn completions(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["message"] == "request completed")
            .collect()
    }
}

/// Routes this thread's events into memory for the rest of the test.
/// `#[tokio::test]` runs on a current-thread runtime, so handler events are
/// captured too.
fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(captured.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}

// ── Request helpers ───────────────────────────────────────────────────────────

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send<B>(router: &Router, req: http::Request<B>) -> Reply
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let response = router.handle(req).await;
    let (parts, body) = response.into_parts();
    let body = body.collect().await.unwrap().to_bytes().to_vec();
    Reply { status: parts.status, headers: parts.headers, body }
}

async fn get(router: &Router, uri: &str) -> Reply {
    send(router, request(Method::GET, uri).body(Full::<Bytes>::default()).unwrap()).await
}

fn request(method: Method, uri: &str) -> http::request::Builder {
    http::Request::builder().method(method).uri(uri)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Answers with the status named in `x-want`.
async fn wanted(req: Request) -> Response {
    let status = req
        .header("x-want")
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);
    Response::status(status)
}

async fn explode(_req: Request) -> Response {
    panic!("widget press jammed")
}

async fn hello(_req: Request) -> &'static str {
    "hello"
}

// ── CORS ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn preflight_never_reaches_the_handler() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    async fn counted(_req: Request) -> &'static str {
        CALLS.fetch_add(1, Ordering::SeqCst);
        "counted"
    }

    let (logs, _guard) = capture();
    let router = Router::new().on(Method::OPTIONS, "/widgets", counted);

    let reply = send(
        &router,
        request(Method::OPTIONS, "/widgets")
            .header("origin", "https://example.com")
            .body(Full::<Bytes>::default())
            .unwrap(),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.is_empty());
    assert_eq!(reply.header("access-control-allow-origin"), Some("https://example.com"));
    assert_eq!(reply.header("access-control-allow-methods"), Some("*"));
    assert_eq!(reply.header("vary"), Some("Origin"));
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
    assert!(logs.completions().is_empty());

    // Without an Origin it is an ordinary request.
    let reply = send(&router, request(Method::OPTIONS, "/widgets").body(Full::<Bytes>::default()).unwrap()).await;
    assert_eq!(reply.body, b"counted");
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispatched_responses_get_cors_defaults() {
    let router = Router::new().get("/hello", hello);
    let reply = get(&router, "/hello").await;

    assert_eq!(reply.header("access-control-allow-methods"), Some("POST, GET, OPTIONS"));
    assert_eq!(reply.header("access-control-allow-origin"), Some("*"));
}

// ── Completion log ────────────────────────────────────────────────────────────

#[tokio::test]
async fn log_level_follows_status_and_route() {
    let (logs, _guard) = capture();
    let router = Router::new().get("/", wanted).get("/widgets", wanted);

    for status in ["200", "404", "401", "500"] {
        send(&router, request(Method::GET, "/").header("x-want", status).body(Full::<Bytes>::default()).unwrap()).await;
    }
    get(&router, "/widgets").await;

    let levels: Vec<_> = logs.completions().iter().map(|e| e["level"].clone()).collect();
    // 401 is a client error like any other 4xx
    assert_eq!(levels, [json!("DEBUG"), json!("WARN"), json!("WARN"), json!("ERROR"), json!("INFO")]);
}

#[tokio::test]
async fn completion_event_carries_metrics_and_trace() {
    let (logs, _guard) = capture();
    let router = Router::new().get("/widgets/{id}", hello);

    let reply = send(
        &router,
        request(Method::GET, "/widgets/7")
            .header("traceparent", TRACEPARENT)
            .body(Full::<Bytes>::default())
            .unwrap(),
    )
    .await;
    assert_eq!(reply.header("traceresponse"), None);

    let events = logs.completions();
    assert_eq!(events.len(), 1);
    let e = &events[0];
    assert_eq!(e["level"], "INFO");
    assert_eq!(e["route"], "/widgets/{id}");
    assert_eq!(e["status"], 200);
    assert_eq!(e["method"], "GET");
    assert_eq!(e["trace.id"], "4bf92f3577b34da6a3ce929d0e0e4736");
    assert_eq!(e["trace.span"], "00f067aa0ba902b7");
    assert!(e["duration_ms"].as_f64().unwrap() >= 0.0);
    assert!(e.get("path").is_none());
    assert!(e.get("error").is_none());
}

#[tokio::test]
async fn root_route_records_literal_path() {
    let (logs, _guard) = capture();
    let router = Router::new().get("/widgets", hello).fallback(hello);

    let reply = get(&router, "/healthz").await;
    assert_eq!(reply.body, b"hello");

    let events = logs.completions();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["route"], "/");
    assert_eq!(events[0]["path"], "/healthz");
    assert_eq!(events[0]["level"], "DEBUG");
}

#[tokio::test]
async fn handler_events_run_inside_the_request_span() {
    async fn chatty(req: Request) -> &'static str {
        assert!(req.trace().is_some());
        tracing::info!("inside handler");
        "ok"
    }

    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_writer(captured.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let router = Router::new().get("/chatty", chatty);
    send(
        &router,
        request(Method::GET, "/chatty")
            .header("traceparent", TRACEPARENT)
            .body(Full::<Bytes>::default())
            .unwrap(),
    )
    .await;

    let events = captured.events();
    let inside = events
        .iter()
        .find(|e| e["fields"]["message"] == "inside handler")
        .unwrap();
    assert_eq!(inside["span"]["name"], "request");
    assert_eq!(inside["span"]["route"], "/chatty");
    assert_eq!(inside["span"]["trace.id"], "4bf92f3577b34da6a3ce929d0e0e4736");
}

// ── Trace context ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_or_malformed_traceparent_is_replaced() {
    let (logs, _guard) = capture();
    let router = Router::new().get("/hello", hello);

    let without = get(&router, "/hello").await;
    let malformed = send(
        &router,
        request(Method::GET, "/hello")
            .header("traceparent", "00-zz-00-01")
            .body(Full::<Bytes>::default())
            .unwrap(),
    )
    .await;

    for reply in [&without, &malformed] {
        assert_eq!(reply.status, StatusCode::OK);
        let minted = TraceParent::parse(reply.header("traceresponse").unwrap()).unwrap();
        assert_eq!(minted.trace_id.0[12..], minted.parent_id.0[4..]);
    }
    assert_ne!(without.header("traceresponse"), malformed.header("traceresponse"));

    let events = logs.completions();
    let minted = TraceParent::parse(without.header("traceresponse").unwrap()).unwrap();
    assert_eq!(events[0]["trace.id"], minted.trace_id.to_string());
    assert_eq!(events[0]["trace.span"], minted.parent_id.to_string());
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn written_failure_reaches_client_and_log() {
    async fn missing(req: Request) -> Response {
        let err = io::Error::new(io::ErrorKind::NotFound, "missing widget 7");
        write_failure(&req, failure::NOT_FOUND.from_error(&err))
    }

    let (logs, _guard) = capture();
    let router = Router::new().get("/widgets/{id}", missing);
    let reply = get(&router, "/widgets/7").await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.header("content-type"), Some("application/json"));
    assert_eq!(
        reply.json(),
        json!({"error": "not_found", "status": 404, "error_description": "missing widget 7"})
    );

    let events = logs.completions();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["level"], "WARN");
    assert_eq!(events[0]["error"], "not_found");
    assert_eq!(events[0]["error_description"], "missing widget 7");
}

#[tokio::test]
async fn unknown_errors_become_server_errors() {
    async fn broken(req: Request) -> Response {
        let result: Result<u32, io::Error> = Err(io::Error::other("disk on fire"));
        write_result(&req, result)
    }

    let (logs, _guard) = capture();
    let router = Router::new().get("/broken", broken);
    let reply = get(&router, "/broken").await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json(),
        json!({"error": "server_error", "status": 500, "error_description": "disk on fire"})
    );
    assert_eq!(logs.completions()[0]["level"], "ERROR");
}

#[tokio::test]
async fn results_write_data_on_success() {
    async fn list(req: Request) -> Response {
        write_result(&req, Ok::<_, tsu::Failure>(vec![1, 2, 3]))
    }

    let router = Router::new().get("/list", list);
    let reply = get(&router, "/list").await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json(), json!([1, 2, 3]));
}

#[tokio::test]
async fn unmatched_routes_are_not_found() {
    let router = Router::new().get("/hello", hello);
    let reply = get(&router, "/nope").await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json(), json!({"error": "not_found", "status": 404}));
}

/// A request body whose connection drops before the first frame.
struct Severed;

impl Body for Severed {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        Poll::Ready(Some(Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset mid-body"))))
    }
}

#[tokio::test]
async fn unreadable_body_is_an_invalid_request() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    async fn upload(_req: Request) -> &'static str {
        CALLS.fetch_add(1, Ordering::SeqCst);
        "stored"
    }

    let (logs, _guard) = capture();
    let router = Router::new().post("/widgets", upload);
    let reply = send(&router, request(Method::POST, "/widgets").body(Severed).unwrap()).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        reply.json(),
        json!({"error": "invalid_request", "status": 400, "error_description": "connection reset mid-body"})
    );
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);

    let events = logs.events();
    let warned: Vec<_> = events.iter().filter(|e| e["message"] == "failed to read request body").collect();
    assert_eq!(warned.len(), 1);
    assert_eq!(warned[0]["level"], "WARN");
    assert_eq!(warned[0]["path"], "/widgets");
    assert!(logs.completions().is_empty());
}

// ── Fault boundary ────────────────────────────────────────────────────────────

#[tokio::test]
async fn panics_are_contained_to_one_request() {
    let (logs, _guard) = capture();
    let router = Router::new().get("/boom", explode).get("/hello", hello);

    let reply = get(&router, "/boom").await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.json(), json!({"error": "server_error", "status": 500}));
    assert_eq!(reply.header("access-control-allow-origin"), Some("*"));

    let events = logs.events();
    let panics: Vec<_> = events.iter().filter(|e| e["message"] == "handler panicked").collect();
    assert_eq!(panics.len(), 1);
    assert_eq!(panics[0]["level"], "ERROR");
    assert_eq!(panics[0]["error"], "panic");
    assert_eq!(panics[0]["method"], "GET");
    assert_eq!(panics[0]["path"], "/boom");
    assert_eq!(panics[0]["error_description"], "widget press jammed");
    assert!(panics[0]["stack"].is_string());
    // nothing reached the completion log
    assert!(logs.completions().is_empty());

    let reply = get(&router, "/hello").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"hello");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_survive_a_panicking_neighbour() {
    let router = Arc::new(Router::new().get("/boom", explode).get("/hello", hello));

    let tasks: Vec<_> = (0..64)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                let uri = if i % 2 == 0 { "/boom" } else { "/hello" };
                (i, get(&router, uri).await.status)
            })
        })
        .collect();

    for task in tasks {
        let (i, status) = task.await.unwrap();
        let expected = if i % 2 == 0 { StatusCode::INTERNAL_SERVER_ERROR } else { StatusCode::OK };
        assert_eq!(status, expected);
    }
}
