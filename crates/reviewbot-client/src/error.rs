//! Error types for reviewbot-client

use thiserror::Error;

/// Errors raised while setting up the Review Board client
#[derive(Error, Debug)]
pub enum ClientError {
    /// A required setting was neither passed nor found in the environment
    #[error("Review Board is not configured: {0} is not set")]
    MissingSetting(&'static str),

    /// The server URL could not be used
    #[error("Invalid Review Board URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Http(err.to_string())
    }
}

/// Result type for client setup
pub type Result<T> = std::result::Result<T, ClientError>;
