//! Error types for swaytasks-core.

use std::path::PathBuf;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in swaytasks-core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found.
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration validation failed.
    #[error("config validation failed:\n{}", .0.join("\n"))]
    ConfigValidation(Vec<String>),

    /// No way to reach the compositor IPC socket.
    #[error("SWAYSOCK is not set and no ipc.socket override is configured")]
    SocketUnavailable,
}
