//! Fault boundary around dispatch.
//!
//! A panicking handler must cost one request, not the connection or the
//! process. [`guard`] polls the dispatch future inside `catch_unwind`; a
//! panic becomes a bare `server_error` response for the client and a
//! single `ERROR` event carrying the panic message and the backtrace taken
//! at the panic site.
//!
//! The backtrace comes from a process panic hook installed on first use.
//! The hook only captures while a guarded future is being polled on the
//! current thread; panics anywhere else go to the previously installed
//! hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::pin;
use std::sync::Once;
use std::task::Poll;

use futures_util::FutureExt;
use futures_util::future::poll_fn;
use http::{Method, Uri};

use crate::failure::SERVER_ERROR;
use crate::response::{IntoResponse, Response};

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

/// Restores the caller's `GUARDED` flag on every exit, unwinding included.
struct Reset(bool);

impl Drop for Reset {
    fn drop(&mut self) {
        GUARDED.with(|g| g.set(self.0));
    }
}

/// Runs `dispatch`, turning a panic into a `server_error` response.
///
/// `method` and `uri` identify the request in the panic event, since the
/// request span is gone by the time the panic is caught.
pub(crate) async fn guard<F>(method: Method, uri: Uri, dispatch: F) -> Response
where
    F: Future<Output = Response>,
{
    install_hook();

    let mut dispatch = pin!(dispatch);
    let guarded = poll_fn(move |cx| -> Poll<Response> {
        let _reset = Reset(GUARDED.with(|g| g.replace(true)));
        dispatch.as_mut().poll(cx)
    });

    match AssertUnwindSafe(guarded).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let stack = BACKTRACE
                .with(|slot| slot.borrow_mut().take())
                .map(|bt| bt.to_string())
                .unwrap_or_default();
            tracing::error!(
                method = %method,
                path = uri.path(),
                error = "panic",
                error_description = %panic_message(payload.as_ref()),
                stack = %stack,
                "handler panicked"
            );
            SERVER_ERROR.into_response()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
