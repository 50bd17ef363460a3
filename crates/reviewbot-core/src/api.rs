//! The remote review service as seen by the core.
//!
//! [`ReviewApi`] is the only way the core touches the network. Implement it
//! with a real HTTP client, or use [`crate::fakes::MemoryReviewApi`] in tests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{FetchResult, Result, ReviewError};
use crate::model::{
    ChangeList, ChangeLogEntry, Diff, DiffList, PostedReview, PostedReviewList, ReviewRequest,
    ReviewRequestEnvelope, ReviewRequestList,
};

/// Injectable transport for the review-hosting service.
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// GET `url` and return the decoded JSON body.
    async fn fetch(&self, url: &str) -> FetchResult<Value>;

    /// POST form-encoded `form` to `url` and return the decoded JSON body.
    async fn post(&self, url: &str, form: &[(&str, &str)]) -> FetchResult<Value>;
}

/// Fetch `url` and decode the body into `T`.
pub async fn fetch_json<T: DeserializeOwned>(api: &dyn ReviewApi, url: &str) -> Result<T> {
    let value = api.fetch(url).await?;
    serde_json::from_value(value).map_err(|source| ReviewError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Fetch a single review request resource.
pub async fn fetch_review_request(api: &dyn ReviewApi, url: &str) -> Result<ReviewRequest> {
    let envelope: ReviewRequestEnvelope = fetch_json(api, url).await?;
    Ok(envelope.review_request)
}

/// Fetch a review request listing and return it most-recently-updated first.
///
/// The service lists query results oldest first.
pub async fn fetch_candidates(api: &dyn ReviewApi, url: &str) -> Result<Vec<ReviewRequest>> {
    let list: ReviewRequestList = fetch_json(api, url).await?;
    let mut candidates = list.review_requests;
    candidates.reverse();
    debug!(url = %url, count = candidates.len(), "fetched candidate review requests");
    Ok(candidates)
}

/// Diff revisions of `review`, oldest first.
pub async fn fetch_diffs(api: &dyn ReviewApi, review: &ReviewRequest) -> Result<Vec<Diff>> {
    let list: DiffList = fetch_json(api, &review.links.diffs.href).await?;
    Ok(list.diffs)
}

/// Reviews posted on `review`, oldest first, at most `page_size` of them.
pub async fn fetch_posted_reviews(
    api: &dyn ReviewApi,
    review: &ReviewRequest,
    page_size: usize,
) -> Result<Vec<PostedReview>> {
    let url = with_query(
        &review.links.reviews.href,
        "max-results",
        &page_size.to_string(),
    );
    let list: PostedReviewList = fetch_json(api, &url).await?;
    Ok(list.reviews)
}

/// Change description log of `review`.
pub async fn fetch_changes(
    api: &dyn ReviewApi,
    review: &ReviewRequest,
) -> Result<Vec<ChangeLogEntry>> {
    let list: ChangeList = fetch_json(api, &review.links.changes.href).await?;
    Ok(list.changes)
}

/// Append `key=value` to `url`, respecting an existing query string.
pub fn with_query(url: &str, key: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{key}={value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeReview, MemoryReviewApi};
    use serde_json::json;

    #[test]
    fn test_with_query_picks_separator() {
        assert_eq!(
            with_query("https://rb/api/r/1/reviews/", "max-results", "200"),
            "https://rb/api/r/1/reviews/?max-results=200"
        );
        assert_eq!(
            with_query("https://rb/api/r/1/reviews/?public=1", "max-results", "5"),
            "https://rb/api/r/1/reviews/?public=1&max-results=5"
        );
    }

    #[tokio::test]
    async fn test_fetch_candidates_reverses_listing() {
        let api = MemoryReviewApi::new();
        let url = "https://reviews.example.org/api/review-requests/?status=pending";
        api.insert(
            url,
            json!({
                "review_requests": [
                    FakeReview::new(1).to_json(),
                    FakeReview::new(2).to_json(),
                    FakeReview::new(3).to_json(),
                ]
            }),
        );

        let ids: Vec<String> = fetch_candidates(&api, url)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_decode_error() {
        let api = MemoryReviewApi::new();
        api.insert("https://rb/api/review-requests/9/", json!({ "unexpected": true }));

        let err = fetch_review_request(&api, "https://rb/api/review-requests/9/")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Decode { ref url, .. } if url.ends_with("/9/")));
    }

    #[tokio::test]
    async fn test_missing_resource_is_fetch_error() {
        let api = MemoryReviewApi::new();
        let err = fetch_review_request(&api, "https://rb/api/review-requests/404/")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Fetch(_)));
    }
}
