//! ReviewBot Core Library
//!
//! Decides which review requests need a CI build and what has to be applied
//! for each of them:
//!
//! - [`DependencyResolver`]: ordered, deduplicated and cycle-checked build sets
//! - [`VerificationGate`]: staleness check against this bot's last review
//! - [`Verifier`]: batch loop combining both, reporting bad reviews
//!
//! The network is reached only through the [`ReviewApi`] trait.

pub mod api;
pub mod error;
pub mod fakes;
pub mod gate;
pub mod model;
pub mod obs;
pub mod report;
pub mod resolver;
pub mod telemetry;
pub mod verifier;

pub use api::{fetch_candidates, fetch_review_request, ReviewApi};
pub use error::{FetchError, FetchResult, Result, ReviewError};
pub use gate::{Staleness, VerificationGate, DEFAULT_REVIEW_PAGE_SIZE};
pub use model::{
    ChangeLogEntry, Diff, Link, PostedReview, ReviewId, ReviewLinks, ReviewRequest, ReviewStatus,
};
pub use report::{
    build_result_message, publish_build_result, rejection_message, Reporter,
    ReviewBoardReporter, TextType,
};
pub use resolver::DependencyResolver;
pub use telemetry::init_tracing;
pub use verifier::{BatchOutcome, Verifier, VerifyConfig, DEFAULT_QUERY};

/// ReviewBot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
