//! Feedback posted back to review requests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::ReviewApi;
use crate::error::{Result, ReviewError};
use crate::model::{ReviewId, ReviewRequest};
use crate::resolver::DependencyResolver;

/// Markup of a posted review body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextType {
    #[default]
    Markdown,
    Plain,
}

impl TextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextType::Markdown => "markdown",
            TextType::Plain => "plain",
        }
    }
}

/// Side-channel for telling a review's author about a problem.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, review: &ReviewRequest, message: &str) -> Result<()>;
}

/// Posts a public review on the review request.
pub struct ReviewBoardReporter {
    api: Arc<dyn ReviewApi>,
    text_type: TextType,
}

impl ReviewBoardReporter {
    pub fn new(api: Arc<dyn ReviewApi>) -> Self {
        Self {
            api,
            text_type: TextType::default(),
        }
    }

    pub fn with_text_type(mut self, text_type: TextType) -> Self {
        self.text_type = text_type;
        self
    }
}

#[async_trait]
impl Reporter for ReviewBoardReporter {
    async fn report(&self, review: &ReviewRequest, message: &str) -> Result<()> {
        info!(review_id = %review.id, %message, "posting review");
        self.api
            .post(
                &review.links.reviews.href,
                &[
                    ("body_top", message),
                    ("body_top_text_type", self.text_type.as_str()),
                    ("public", "true"),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Body posted on a review that cannot be verified.
pub fn rejection_message(err: &ReviewError) -> String {
    format!("Bad review!\n\nError:\n{err}")
}

/// Body posted on a review once its build finished.
///
/// `applied` is a build set (dependencies first); the comment lists it with
/// the reviewed request first.
pub fn build_result_message(message: &str, applied: &[ReviewId], logs_url: &str) -> String {
    let applied = applied
        .iter()
        .rev()
        .map(ReviewId::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{message}\n\nReviews applied: [{applied}]\n\nLogs available here: {logs_url}")
}

/// Post the outcome of a build on `review`.
///
/// The applied reviews are re-resolved so the comment lists exactly what the
/// build used. A cyclic dependency turns the comment into a rejection.
/// Returns the posted body.
pub async fn publish_build_result(
    api: &dyn ReviewApi,
    reporter: &dyn Reporter,
    review: &ReviewRequest,
    message: &str,
    logs_url: &str,
) -> Result<String> {
    let body = match DependencyResolver::new(api).resolve(review).await {
        Ok(applied) => build_result_message(message, &applied, logs_url),
        Err(err) if err.is_rejection() => rejection_message(&err),
        Err(err) => return Err(err),
    };
    reporter.report(review, &body).await?;
    Ok(body)
}
