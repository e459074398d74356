//! Unified error type.

use crate::config::ConfigError;

/// The error type returned by tsu's fallible operations.
///
/// Application-level errors are [`Failure`](crate::Failure) responses, not
/// `Error`s. This type covers startup and infrastructure: reading the
/// configuration, installing the logger, binding the port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(String),
}
