//! Error types for reviewbot-dispatch

use thiserror::Error;

/// Errors that can occur while delivering review ids
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No Gearman server was configured
    #[error("No gearman servers to trigger the jobs")]
    NoServers,

    /// A server address could not be parsed
    #[error("Invalid gearman server address '{0}'")]
    InvalidServer(String),

    /// Extra job parameters were not a JSON object
    #[error("Invalid job parameters: {0}")]
    InvalidParams(String),

    /// The peer violated the Gearman protocol
    #[error("Gearman protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;
