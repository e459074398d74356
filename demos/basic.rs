//! Minimal tsu service: JSON endpoints, failures, a panicking route and
//! health checks.
//!
//! Run with:
//!   DEMO_PORT=3000 FORCE_CONSOLE=1 cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/widgets/7
//!   curl -i http://localhost:3000/widgets/8
//!   curl -i -H 'traceparent: 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01' \
//!        http://localhost:3000/widgets/7
//!   curl -i -X POST http://localhost:3000/widgets -d '{"name":"sprocket"}'
//!   curl -i http://localhost:3000/boom
//!   curl -i -X OPTIONS -H 'origin: https://example.com' http://localhost:3000/widgets
//!   curl -i http://localhost:3000/

use http::StatusCode;
use serde::Serialize;
use tsu::{Config, Request, Response, Router, Server, failure, health, logging, write_failure, write_result};

#[derive(Serialize)]
struct Widget {
    id: u32,
    name: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), tsu::Error> {
    let config = Config::from_env("demo")?;
    logging::init(&config.log)?;

    let app = Router::new()
        .get("/widgets/{id}", get_widget)
        .post("/widgets", create_widget)
        .get("/boom", boom)
        .get("/", health::liveness)
        .fallback(health::readiness);

    Server::from_config(&config).serve(app).await
}

// GET /widgets/{id}
async fn get_widget(req: Request) -> Response {
    let widget = req
        .param("id")
        .ok_or(failure::INVALID_REQUEST)
        .and_then(|id| id.parse::<u32>().map_err(|e| failure::INVALID_REQUEST.from_error(&e)))
        .and_then(|id| match id {
            7 => Ok(Widget { id, name: "sprocket" }),
            _ => Err(failure::NOT_FOUND.from_error(&format!("missing widget {id}"))),
        });

    write_result(&req, widget)
}

// POST /widgets
async fn create_widget(req: Request) -> Response {
    if req.body().is_empty() {
        return write_failure(&req, failure::INVALID_REQUEST.from_error("empty body"));
    }
    tracing::info!(bytes = req.body().len(), "creating widget");

    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/widgets/8")
        .json(br#"{"id":8,"name":"new"}"#.to_vec())
}

// GET /boom, answered by the fault boundary
async fn boom(_req: Request) -> Response {
    panic!("widget press jammed")
}
