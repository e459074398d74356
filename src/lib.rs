//! # tsu
//!
//! A minimal HTTP framework for Rust services behind a reverse proxy, with
//! request instrumentation built in rather than bolted on.
//!
//! Every route registered on a [`Router`] is wrapped so that each request:
//!
//! - carries a W3C trace context, taken from `traceparent` or generated
//!   and echoed back in `traceresponse` ([`trace`]),
//! - runs inside a `request` span with method, route and trace ids,
//! - ends with exactly one `request completed` event whose level follows
//!   the outcome ([`middleware::trace`]),
//! - reports errors in one client-facing shape ([`failure`]).
//!
//! Around dispatch, a CORS gate answers preflight requests and a fault
//! boundary turns handler panics into `500 server_error` responses without
//! affecting other requests.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu::{Config, Request, Response, Router, Server, failure, health, logging, write_failure};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu::Error> {
//!     let config = Config::from_env("widgets")?;
//!     logging::init(&config.log)?;
//!
//!     let app = Router::new()
//!         .get("/widgets/{id}", get_widget)
//!         .fallback(health::liveness);
//!
//!     Server::from_config(&config).serve(app).await
//! }
//!
//! async fn get_widget(req: Request) -> Response {
//!     match req.param("id") {
//!         Some("7") => Response::json(br#"{"id":7}"#.to_vec()),
//!         _ => write_failure(&req, failure::NOT_FOUND),
//!     }
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod failure;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod trace;

pub use config::{Config, LogConfig};
pub use error::Error;
pub use failure::{Failure, write_failure};
pub use handler::Handler;
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder, write_json, write_result};
pub use router::Router;
pub use server::Server;
pub use trace::TraceParent;
