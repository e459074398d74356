//! Built-in middleware, applied by [`Router`](crate::Router) without opt-in.
//!
//! In request order:
//!
//! - `cors` — answers preflight requests before routing
//! - `recover` — fault boundary around dispatch
//! - [`trace`] — per-route trace context, timing and completion log

pub(crate) mod cors;
pub(crate) mod recover;
pub mod trace;
