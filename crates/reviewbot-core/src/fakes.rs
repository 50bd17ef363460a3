//! In-memory fakes for the service traits (testing only)
//!
//! Provides `MemoryReviewApi`, a URL-keyed response table implementing
//! [`ReviewApi`], `FakeReview` for building review requests shaped like the
//! Review Board web API, and `RecordingReporter`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::api::ReviewApi;
use crate::error::{FetchError, FetchResult, Result};
use crate::model::{ReviewId, ReviewRequest};
use crate::report::Reporter;

/// Base URL used by [`FakeReview`] resources.
pub const FAKE_BASE_URL: &str = "https://reviews.example.org";

/// Resource URL of review request `id` under [`FAKE_BASE_URL`].
pub fn review_url(id: u64) -> String {
    format!("{FAKE_BASE_URL}/api/review-requests/{id}/")
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

// ---------------------------------------------------------------------------
// MemoryReviewApi
// ---------------------------------------------------------------------------

/// A form POST captured by [`MemoryReviewApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPost {
    pub url: String,
    pub form: Vec<(String, String)>,
}

impl RecordedPost {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Review service backed by a `HashMap<url, json>`.
///
/// Lookups try the exact URL first and then the URL without its query
/// string. Unknown URLs answer with a 404 [`FetchError::Status`].
#[derive(Debug, Default)]
pub struct MemoryReviewApi {
    responses: Mutex<HashMap<String, Value>>,
    failures: Mutex<HashMap<String, FetchError>>,
    fetched: Mutex<Vec<String>>,
    posted: Mutex<Vec<RecordedPost>>,
}

impl MemoryReviewApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn insert(&self, url: impl Into<String>, body: Value) {
        self.responses.lock().unwrap().insert(url.into(), body);
    }

    /// Fail every request to `url` with `error`.
    pub fn fail(&self, url: impl Into<String>, error: FetchError) {
        self.failures.lock().unwrap().insert(url.into(), error);
    }

    /// Register a review request together with its diff, review and change
    /// collections.
    pub fn add(&self, review: &FakeReview) {
        let base = review_url(review.id);
        self.insert(base.clone(), json!({ "review_request": review.to_json() }));
        self.insert(format!("{base}diffs/"), json!({ "diffs": review.diffs_json() }));
        self.insert(
            format!("{base}reviews/"),
            json!({ "reviews": review.reviews_json() }),
        );
        self.insert(
            format!("{base}changes/"),
            json!({ "changes": review.changes_json() }),
        );
    }

    /// Every URL fetched so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    /// Every POST issued so far, in order.
    pub fn posted(&self) -> Vec<RecordedPost> {
        self.posted.lock().unwrap().clone()
    }

    fn failure_for(&self, url: &str) -> Option<FetchError> {
        let failures = self.failures.lock().unwrap();
        failures
            .get(url)
            .or_else(|| failures.get(strip_query(url)))
            .cloned()
    }
}

#[async_trait]
impl ReviewApi for MemoryReviewApi {
    async fn fetch(&self, url: &str) -> FetchResult<Value> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(err) = self.failure_for(url) {
            return Err(err);
        }
        let responses = self.responses.lock().unwrap();
        responses
            .get(url)
            .or_else(|| responses.get(strip_query(url)))
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
                body: "Object does not exist".to_string(),
            })
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> FetchResult<Value> {
        self.posted.lock().unwrap().push(RecordedPost {
            url: url.to_string(),
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        if let Some(err) = self.failure_for(url) {
            return Err(err);
        }
        Ok(json!({ "stat": "ok" }))
    }
}

// ---------------------------------------------------------------------------
// FakeReview
// ---------------------------------------------------------------------------

/// Builder for review request fixtures.
///
/// Defaults to a pending review with one reviewer and no diffs.
#[derive(Debug, Clone)]
pub struct FakeReview {
    id: u64,
    status: String,
    depends_on: Vec<u64>,
    blocks: Vec<u64>,
    target_people: Vec<String>,
    diffs: Vec<String>,
    reviews: Vec<(String, String)>,
    changes: Vec<(Vec<String>, String)>,
}

impl FakeReview {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            status: "pending".to_string(),
            depends_on: Vec::new(),
            blocks: Vec::new(),
            target_people: vec!["reviewer".to_string()],
            diffs: Vec::new(),
            reviews: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn submitted(self) -> Self {
        self.status("submitted")
    }

    pub fn depends_on(mut self, ids: &[u64]) -> Self {
        self.depends_on = ids.to_vec();
        self
    }

    pub fn blocks(mut self, ids: &[u64]) -> Self {
        self.blocks = ids.to_vec();
        self
    }

    pub fn without_reviewers(mut self) -> Self {
        self.target_people.clear();
        self
    }

    /// Append a diff revision (call oldest first).
    pub fn diff(mut self, timestamp: &str) -> Self {
        self.diffs.push(timestamp.to_string());
        self
    }

    /// Append a posted review (call oldest first).
    pub fn review_by(mut self, author: &str, timestamp: &str) -> Self {
        self.reviews.push((author.to_string(), timestamp.to_string()));
        self
    }

    /// Append a change log entry touching `fields`.
    pub fn change(mut self, fields: &[&str], timestamp: &str) -> Self {
        self.changes.push((
            fields.iter().map(|f| f.to_string()).collect(),
            timestamp.to_string(),
        ));
        self
    }

    /// The `review_request` object.
    pub fn to_json(&self) -> Value {
        let base = review_url(self.id);
        let links = |ids: &[u64]| -> Vec<Value> {
            ids.iter()
                .map(|id| json!({ "href": review_url(*id), "title": format!("review {id}") }))
                .collect()
        };
        let people: Vec<Value> = self
            .target_people
            .iter()
            .map(|name| json!({ "href": format!("{FAKE_BASE_URL}/api/users/{name}/"), "title": name }))
            .collect();

        json!({
            "id": self.id,
            "status": self.status,
            "summary": format!("review {}", self.id),
            "depends_on": links(&self.depends_on),
            "blocks": links(&self.blocks),
            "target_people": people,
            "links": {
                "self": { "href": base, "method": "GET" },
                "diffs": { "href": format!("{base}diffs/"), "method": "GET" },
                "reviews": { "href": format!("{base}reviews/"), "method": "GET" },
                "changes": { "href": format!("{base}changes/"), "method": "GET" }
            }
        })
    }

    /// Decoded form of [`FakeReview::to_json`].
    pub fn to_request(&self) -> ReviewRequest {
        serde_json::from_value(self.to_json()).expect("fixture is a valid review request")
    }

    fn diffs_json(&self) -> Vec<Value> {
        self.diffs
            .iter()
            .enumerate()
            .map(|(i, ts)| json!({ "id": i + 1, "revision": i + 1, "timestamp": ts }))
            .collect()
    }

    fn reviews_json(&self) -> Vec<Value> {
        self.reviews
            .iter()
            .map(|(author, ts)| {
                json!({
                    "timestamp": ts,
                    "public": true,
                    "links": {
                        "user": {
                            "href": format!("{FAKE_BASE_URL}/api/users/{author}/"),
                            "title": author
                        }
                    }
                })
            })
            .collect()
    }

    fn changes_json(&self) -> Vec<Value> {
        self.changes
            .iter()
            .map(|(fields, ts)| {
                let fields_changed: Map<String, Value> = fields
                    .iter()
                    .map(|f| (f.clone(), json!({})))
                    .collect();
                json!({ "timestamp": ts, "fields_changed": fields_changed })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Reporter that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(ReviewId, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(ReviewId, String)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report(&self, review: &ReviewRequest, message: &str) -> Result<()> {
        self.reports
            .lock()
            .unwrap()
            .push((review.id.clone(), message.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_api_ignores_query_when_unmatched() {
        let api = MemoryReviewApi::new();
        api.add(&FakeReview::new(7).review_by("bot", "2017-01-01T00:00:00Z"));

        let body = api
            .fetch(&format!("{}reviews/?max-results=200", review_url(7)))
            .await
            .unwrap();
        assert_eq!(body["reviews"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_api_records_posts_and_failures() {
        let api = MemoryReviewApi::new();
        api.fail(
            "https://rb/down",
            FetchError::Transport {
                url: "https://rb/down".to_string(),
                message: "refused".to_string(),
            },
        );

        assert!(api.post("https://rb/down", &[("public", "true")]).await.is_err());
        let posts = api.posted();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].field("public"), Some("true"));
    }

    #[test]
    fn test_fake_review_decodes() {
        let review = FakeReview::new(3).depends_on(&[1, 2]).submitted().to_request();
        assert_eq!(review.id, ReviewId::from(3));
        assert!(review.is_submitted());
        assert_eq!(review.depends_on.len(), 2);
        assert_eq!(review.depends_on[0].href, review_url(1));
    }
}
