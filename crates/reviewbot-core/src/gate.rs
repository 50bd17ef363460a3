//! Verification staleness check.
//!
//! A review request needs verification when something relevant happened
//! since this automation last reviewed it: a newer diff was uploaded, or its
//! dependency list was edited. Only timestamps exposed by the service are
//! compared; nothing is persisted locally.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::api::{fetch_changes, fetch_diffs, fetch_posted_reviews, ReviewApi};
use crate::error::Result;
use crate::model::{ReviewRequest, DEPENDS_ON_FIELD};

/// Default page size when listing posted reviews.
pub const DEFAULT_REVIEW_PAGE_SIZE: usize = 200;

/// The three instants the staleness decision is based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    /// Timestamp of the most recent diff.
    pub diff_time: DateTime<Utc>,
    /// Timestamp of the most recent review posted by this automation.
    pub review_time: Option<DateTime<Utc>>,
    /// Timestamp of the most recent change to `depends_on`.
    pub dependency_time: Option<DateTime<Utc>>,
}

impl Staleness {
    /// `true` when never reviewed, or when the diff or the dependency list
    /// changed strictly after the last review.
    pub fn needs_verification(&self) -> bool {
        match self.review_time {
            None => true,
            Some(reviewed) => {
                reviewed < self.diff_time
                    || self
                        .dependency_time
                        .is_some_and(|changed| reviewed < changed)
            }
        }
    }
}

/// Decides whether review requests need verification.
pub struct VerificationGate<'a> {
    api: &'a dyn ReviewApi,
    identity: &'a str,
    review_page_size: usize,
}

impl<'a> VerificationGate<'a> {
    /// `identity` is the username this automation posts reviews as.
    pub fn new(api: &'a dyn ReviewApi, identity: &'a str) -> Self {
        Self {
            api,
            identity,
            review_page_size: DEFAULT_REVIEW_PAGE_SIZE,
        }
    }

    pub fn with_review_page_size(mut self, page_size: usize) -> Self {
        self.review_page_size = page_size;
        self
    }

    /// Return `true` if `review` needs to be verified.
    pub async fn needs_verification(&self, review: &ReviewRequest) -> Result<bool> {
        debug!(review_id = %review.id, "checking if review needs verification");

        if review.is_submitted() {
            info!(review_id = %review.id, "review is already submitted");
            return Ok(false);
        }

        if review.is_blocking() {
            info!(review_id = %review.id, "skipping blocking review");
            return Ok(false);
        }

        match self.staleness(review).await? {
            None => {
                info!(review_id = %review.id, "skipping review without diffs");
                Ok(false)
            }
            Some(staleness) => Ok(staleness.needs_verification()),
        }
    }

    /// Collect the timestamps for `review`, or `None` when it has no diff.
    pub async fn staleness(&self, review: &ReviewRequest) -> Result<Option<Staleness>> {
        let diffs = fetch_diffs(self.api, review).await?;
        let Some(latest_diff) = diffs.last() else {
            return Ok(None);
        };
        let diff_time = latest_diff.timestamp;
        debug!(review_id = %review.id, %diff_time, "latest diff timestamp");

        let reviews = fetch_posted_reviews(self.api, review, self.review_page_size).await?;
        let review_time = reviews
            .iter()
            .rev()
            .find(|posted| posted.author() == Some(self.identity))
            .map(|posted| posted.timestamp);
        if let Some(review_time) = review_time {
            debug!(review_id = %review.id, %review_time, "latest review timestamp");
        }

        let changes = fetch_changes(self.api, review).await?;
        let dependency_time = changes
            .iter()
            .filter(|change| change.touches(DEPENDS_ON_FIELD))
            .map(|change| change.timestamp)
            .max();
        if let Some(dependency_time) = dependency_time {
            debug!(review_id = %review.id, %dependency_time, "latest dependency change timestamp");
        }

        Ok(Some(Staleness {
            diff_time,
            review_time,
            dependency_time,
        }))
    }
}
