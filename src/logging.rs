//! Logger factory.
//!
//! Installs the process-wide `tracing` subscriber from an explicit
//! [`LogConfig`]. Call it once, before serving. `RUST_LOG` directives, when
//! present, take precedence over the configured level.
//!
//! Output is JSON, one object per line, unless stdout is a terminal or
//! `force_console` is set, in which case the human-readable format is used.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::config::LogConfig;
use crate::error::Error;

pub fn init(config: &LogConfig) -> Result<(), Error> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let builder = fmt().with_env_filter(filter);

    let installed = if config.force_console || std::io::stdout().is_terminal() {
        builder.try_init()
    } else {
        builder.json().flatten_event(true).with_current_span(true).try_init()
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}
