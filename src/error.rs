//! Error types.
//!
//! Per-server failures ([`ServerError`]) never escape their poller; they are
//! turned into data (an empty batch plus a reachability flag). Only
//! [`ConfigError`] is fatal.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a single server call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerError {
    /// Transport-level failure talking to the server.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call did not complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered, but rejected the request or sent something unreadable.
    #[error("server error: {0}")]
    Protocol(String),

    /// The call was abandoned because the monitor is shutting down.
    #[error("cancelled")]
    Cancelled,
}

/// Errors surfaced to the operator after an explain or kill.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The action named a server that is not being monitored.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// The operation has no query document or namespace to explain.
    #[error("Only queries with namespace can be explained.")]
    NotExplainable,

    /// The server call behind the action failed.
    #[error("{action} on {server} failed: {source}")]
    Failed {
        action: &'static str,
        server: String,
        #[source]
        source: ServerError,
    },
}

/// Errors that prevent the monitor from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the config file nor the command line named a server.
    #[error("no servers configured (pass addresses, a config file with [[server]] entries, or --demo)")]
    NoServers,

    /// Two server entries share an address.
    #[error("duplicate server address: {0}")]
    DuplicateAddress(String),

    /// A duration setting could not be parsed.
    #[error("invalid duration for `{key}`: {value}")]
    InvalidDuration { key: &'static str, value: String },

    /// The config file or environment could not be read.
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}
