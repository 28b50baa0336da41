//! Error types for lifeseed-core

use thiserror::Error;

/// Result type alias using lifeseed-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lifeseed-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store unavailable or schema not initialized
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Network absent or remote backend unreachable; expected and frequent.
    /// Sync treats this as "skip this pass", never as a crash.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// A remote operation was attempted without an authenticated session
    #[error("No authenticated session")]
    AuthRequired,
}
