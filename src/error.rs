//! Crate error type. Stale pids and denied queries are not errors; they are
//! absorbed by the resolver.

use crate::os::OsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected OS error while resolving pid {pid}")]
    Resolve {
        pid: u32,
        #[source]
        source: OsError,
    },

    #[error("process snapshot failed")]
    Snapshot(#[source] OsError),

    #[error("event subscription setup failed")]
    Subscription(#[source] OsError),

    #[error("invalid config {path}")]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
