//! Process configuration from the environment.
//!
//! Read once at startup and passed around as a plain value. Variables are
//! prefixed with the upper-cased application name:
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `<APP>_PORT` | `8080` | listening port |
//! | `<APP>_LOG_LEVEL` | `info` | `trace`, `debug`, `info`, `warn`, `error` or `off` |
//! | `FORCE_CONSOLE` | unset | human-readable logs even when stdout is not a terminal |

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};

use tracing_subscriber::filter::LevelFilter;

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: `{value}` is not a valid port")]
    Port { var: String, value: String },

    #[error("{var}: `{value}` is not a log level")]
    LogLevel { var: String, value: String },
}

/// Logger factory input.
#[derive(Clone, Debug, PartialEq)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub force_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LevelFilter::INFO, force_console: false }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub app: String,
    pub port: u16,
    pub log: LogConfig,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env(app: &str) -> Result<Self, ConfigError> {
        Self::from_vars(app, std::env::vars())
    }

    /// Reads configuration from explicit pairs.
    pub fn from_vars<I, K, V>(app: &str, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let prefix = app.to_ascii_uppercase().replace('-', "_");

        let port_var = format!("{prefix}_PORT");
        let port = match vars.get(&port_var) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Port {
                var: port_var.clone(),
                value: value.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let level_var = format!("{prefix}_LOG_LEVEL");
        let level = match vars.get(&level_var) {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::LogLevel {
                var: level_var.clone(),
                value: value.clone(),
            })?,
            None => LevelFilter::INFO,
        };

        let force_console = vars.get("FORCE_CONSOLE").is_some_and(|v| !v.is_empty());

        Ok(Self {
            app: app.to_owned(),
            port,
            log: LogConfig { level, force_console },
        })
    }

    /// All interfaces, configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
