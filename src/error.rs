//! Error types and exit codes for tf2-roster-relay

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Startup failed: {message}")]
    StartupFailure { message: String },

    #[error("RCON error: {message}")]
    RconError { message: String },

    #[error("RCON authentication rejected")]
    RconAuthRejected,

    #[error("Push channel send failed: {message}")]
    TransportFailure { message: String },

    #[error("Failed to serialize {what}: {source}")]
    SerializationFailure {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Convert error to a process exit code:
    /// - 1: IO / configuration
    /// - 2: startup (identity or log source)
    /// - 3: RCON connection or authentication
    /// - 4: internal (serialization, storage, transport)
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) | Self::ConfigError { .. } => ExitCode::from(1),
            Self::StartupFailure { .. } => ExitCode::from(2),
            Self::RconError { .. } | Self::RconAuthRejected => ExitCode::from(3),
            Self::TransportFailure { .. }
            | Self::SerializationFailure { .. }
            | Self::StorageError { .. } => ExitCode::from(4),
        }
    }

    pub(crate) fn startup(message: impl Into<String>) -> Self {
        Self::StartupFailure {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageError {
            message: e.to_string(),
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
