//! Error taxonomy for review resolution and verification.

use thiserror::Error;

use crate::model::ReviewId;

/// Failures reported by a [`crate::ReviewApi`] implementation.
///
/// These are never retried by the core; callers decide whether to skip the
/// candidate or abort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The service answered with a non-success HTTP status.
    #[error("error handling URL {url}: {status} ({body})")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("error handling URL {url}: {message}")]
    Transport { url: String, message: String },

    /// The response body was not JSON.
    #[error("invalid response body from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

impl FetchError {
    /// URL the failing request was sent to.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::InvalidBody { url, .. } => url,
        }
    }
}

/// Convenience result alias for transport calls.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Errors produced while resolving or verifying a review request.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The `depends_on` closure of `review_id` revisits `repeated`.
    #[error(
        "Circular dependency detected for review {review_id}. Please fix the 'depends_on' field."
    )]
    Cycle {
        review_id: ReviewId,
        repeated: ReviewId,
    },

    /// The review request has nobody in `target_people`.
    #[error(
        "No reviewers specified. Please find a reviewer by asking on JIRA or the mailing list."
    )]
    MissingReviewers { review_id: ReviewId },

    /// The remote service could not be reached or refused the request.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The remote service answered with a payload of an unexpected shape.
    #[error("unexpected payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ReviewError {
    /// `true` for problems with the review itself, which are reported back to
    /// its author rather than logged and skipped.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ReviewError::Cycle { .. } | ReviewError::MissingReviewers { .. }
        )
    }
}

/// Result type for review operations.
pub type Result<T> = std::result::Result<T, ReviewError>;
