//! Error types for configuration loading and per-connection proxying.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while serving a single client connection.
///
/// None of these are fatal to the process; the worker logs them and
/// drops the connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Reading the request from the client failed.
    #[error("failed to read from client: {0}")]
    ClientRead(#[source] io::Error),

    /// Writing a response to the client failed.
    #[error("failed to write to client: {0}")]
    ClientWrite(#[source] io::Error),

    /// A request or header line exceeded the configured limit.
    #[error("line exceeds configured limit of {limit} bytes")]
    LineTooLong { limit: usize },

    /// The origin could not be reached.
    #[error("failed to connect to origin {origin}: {source}")]
    OriginConnect {
        origin: String,
        #[source]
        source: io::Error,
    },

    /// Sending the forwarded request to the origin failed.
    #[error("failed to write to origin: {0}")]
    OriginWrite(#[source] io::Error),

    /// Reading the origin's response failed mid-transfer.
    #[error("failed to read from origin: {0}")]
    OriginRead(#[source] io::Error),
}
