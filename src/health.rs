//! Health-check handlers.
//!
//! Mount them on the root route (or as the router fallback) so probe
//! traffic logs at `DEBUG` and stays out of normal output:
//!
//! ```rust
//! use tsu::{Router, health};
//!
//! let app = Router::new()
//!     .get("/", health::liveness)
//!     .fallback(health::readiness);
//! ```

use serde::Serialize;

use crate::{Request, Response, write_json};

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

/// Always `200 {"status":"ok"}`. If the process can answer HTTP, it is alive.
pub async fn liveness(_req: Request) -> Response {
    write_json(&Health { status: "ok" })
}

/// `200 {"status":"ready"}`. Replace with your own handler when readiness
/// depends on downstream services.
pub async fn readiness(_req: Request) -> Response {
    write_json(&Health { status: "ready" })
}
