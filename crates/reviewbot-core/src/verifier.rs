//! Batch verification of candidate review requests.
//!
//! [`Verifier::run`] walks the candidates in the order given, keeps the ones
//! the [`VerificationGate`] flags, expands each into its build set with the
//! [`DependencyResolver`] and concatenates the results. Problems with a single
//! candidate never abort the batch: cycles and missing reviewers are reported
//! to the review, fetch failures are logged and the candidate is skipped.

use std::sync::Arc;

use tracing::{debug, info, Instrument};

use crate::api::{fetch_candidates, ReviewApi};
use crate::error::{Result, ReviewError};
use crate::gate::{VerificationGate, DEFAULT_REVIEW_PAGE_SIZE};
use crate::model::{ReviewId, ReviewRequest};
use crate::obs;
use crate::report::{rejection_message, Reporter};
use crate::resolver::DependencyResolver;

/// Query used when none is given: pending Mesos reviews.
pub const DEFAULT_QUERY: &str =
    "?to-groups=mesos&status=pending&last-updated-from=2017-01-01T00:00:00";

/// Explicit settings for one verification batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Username this automation posts reviews as.
    pub identity: String,
    /// Maximum number of accepted candidates; `None` is unbounded.
    pub limit: Option<usize>,
    /// Page size used when listing posted reviews.
    pub review_page_size: usize,
}

impl VerifyConfig {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            limit: None,
            review_page_size: DEFAULT_REVIEW_PAGE_SIZE,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_review_page_size(mut self, page_size: usize) -> Self {
        self.review_page_size = page_size;
        self
    }

    fn limit_reached(&self, accepted: usize) -> bool {
        self.limit.is_some_and(|limit| accepted >= limit)
    }
}

/// Result of a verification batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Concatenated build sets of accepted candidates, in candidate order.
    /// Not deduplicated across candidates.
    pub review_ids: Vec<ReviewId>,
    /// Candidates that needed verification and resolved cleanly.
    pub accepted: Vec<ReviewId>,
    /// Candidates reported back to their authors, with the posted reason.
    pub rejected: Vec<(ReviewId, String)>,
    /// Candidates that could not be evaluated, with the error.
    pub skipped: Vec<(ReviewId, String)>,
}

/// Runs the gate/resolve loop over a batch of candidates.
pub struct Verifier {
    api: Arc<dyn ReviewApi>,
    reporter: Arc<dyn Reporter>,
    config: VerifyConfig,
}

impl Verifier {
    pub fn new(api: Arc<dyn ReviewApi>, reporter: Arc<dyn Reporter>, config: VerifyConfig) -> Self {
        Self {
            api,
            reporter,
            config,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Fetch the candidates listed at `query_url` and verify them.
    ///
    /// Failure to fetch the listing itself is the only fatal error.
    pub async fn verify_query(&self, query_url: &str) -> Result<BatchOutcome> {
        let candidates = fetch_candidates(self.api.as_ref(), query_url).await?;
        info!(count = candidates.len(), "fetched review requests");
        Ok(self.run(&candidates).await)
    }

    /// Verify `candidates` in the order given.
    pub async fn run(&self, candidates: &[ReviewRequest]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for candidate in candidates {
            if self.config.limit_reached(outcome.accepted.len()) {
                debug!(limit = ?self.config.limit, "verification limit reached");
                break;
            }

            let span = obs::review_span(&candidate.id);
            self.process(candidate, &mut outcome).instrument(span).await;
        }

        obs::emit_batch_finished(
            outcome.accepted.len(),
            outcome.rejected.len(),
            outcome.skipped.len(),
            outcome.review_ids.len(),
        );
        outcome
    }

    async fn process(&self, candidate: &ReviewRequest, outcome: &mut BatchOutcome) {
        match self.evaluate(candidate).await {
            Ok(None) => {}
            Ok(Some(build_set)) => {
                obs::emit_review_resolved(&candidate.id, &build_set);
                outcome.review_ids.extend(build_set);
                outcome.accepted.push(candidate.id.clone());
            }
            Err(err) if err.is_rejection() => {
                obs::emit_review_rejected(&candidate.id, &err);
                let message = rejection_message(&err);
                if let Err(report_err) = self.reporter.report(candidate, &message).await {
                    obs::emit_report_failed(&candidate.id, &report_err);
                }
                outcome
                    .rejected
                    .push((candidate.id.clone(), err.to_string()));
            }
            Err(err) => {
                obs::emit_review_skipped(&candidate.id, &err);
                outcome.skipped.push((candidate.id.clone(), err.to_string()));
            }
        }
    }

    /// `Ok(None)` when the candidate does not need verification, otherwise its
    /// build set.
    async fn evaluate(&self, candidate: &ReviewRequest) -> Result<Option<Vec<ReviewId>>> {
        let api = self.api.as_ref();

        let needs_verification = VerificationGate::new(api, &self.config.identity)
            .with_review_page_size(self.config.review_page_size)
            .needs_verification(candidate)
            .await?;
        obs::emit_review_checked(&candidate.id, needs_verification);
        if !needs_verification {
            return Ok(None);
        }

        if candidate.target_people.is_empty() {
            return Err(ReviewError::MissingReviewers {
                review_id: candidate.id.clone(),
            });
        }

        let build_set = DependencyResolver::new(api).resolve(candidate).await?;
        Ok(Some(build_set))
    }
}
