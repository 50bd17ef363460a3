//! Structured events for the verification batch lifecycle.
//!
//! Events are emitted at `info!` level except failures, which are `warn!`.
//! Wrap per-candidate work in [`review_span`] so that every log line carries
//! the review id.

use tracing::{info, warn, Span};

use crate::model::ReviewId;

/// Span tagging all work done for one review request.
pub fn review_span(review_id: &ReviewId) -> Span {
    tracing::info_span!("reviewbot.review", review_id = %review_id)
}

/// Emit event: staleness decision for a candidate.
pub fn emit_review_checked(review_id: &ReviewId, needs_verification: bool) {
    info!(
        event = "review.checked",
        review_id = %review_id,
        needs_verification = needs_verification,
    );
}

/// Emit event: candidate accepted with its build set.
pub fn emit_review_resolved(review_id: &ReviewId, build_set: &[ReviewId]) {
    info!(
        event = "review.resolved",
        review_id = %review_id,
        build_set_len = build_set.len(),
        build_set = ?build_set,
    );
}

/// Emit event: candidate rejected and reported to its author.
pub fn emit_review_rejected(review_id: &ReviewId, reason: &dyn std::fmt::Display) {
    info!(event = "review.rejected", review_id = %review_id, reason = %reason);
}

/// Emit event: candidate skipped because the service could not be queried.
pub fn emit_review_skipped(review_id: &ReviewId, error: &dyn std::fmt::Display) {
    warn!(event = "review.skipped", review_id = %review_id, error = %error);
}

/// Emit event: posting feedback to a review failed.
pub fn emit_report_failed(review_id: &ReviewId, error: &dyn std::fmt::Display) {
    warn!(event = "review.report_failed", review_id = %review_id, error = %error);
}

/// Emit event: batch finished.
pub fn emit_batch_finished(accepted: usize, rejected: usize, skipped: usize, total_ids: usize) {
    info!(
        event = "batch.finished",
        accepted = accepted,
        rejected = rejected,
        skipped = skipped,
        total_ids = total_ids,
    );
}
