//! Review Board resources as consumed by the verifier.
//!
//! Every type here is a read-only snapshot of a remote resource. Unknown
//! fields are ignored so the structs track only what resolution and the
//! staleness check need.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Timestamp format used by the Review Board web API.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Change-log field that records edits to the dependency list.
pub const DEPENDS_ON_FIELD: &str = "depends_on";

/// Review request identifier.
///
/// The service emits integers, older payloads and CLI input carry strings;
/// both normalise to the same textual form so comparisons stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ReviewId(String);

impl ReviewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ReviewId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ReviewId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ReviewId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => ReviewId(n.to_string()),
            RawId::Text(s) => ReviewId(s),
        })
    }
}

/// Lifecycle state of a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    /// Already committed upstream; excluded from build sets.
    Submitted,
    Discarded,
    #[serde(other)]
    Other,
}

/// Hyperlink to another API resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Link {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            title: None,
        }
    }
}

/// Collections hanging off a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLinks {
    pub diffs: Link,
    pub reviews: Link,
    pub changes: Link,
}

/// Snapshot of a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: ReviewId,
    pub status: ReviewStatus,
    #[serde(default)]
    pub summary: String,
    /// Reviews that must be applied before this one, in declared order.
    #[serde(default)]
    pub depends_on: Vec<Link>,
    /// Reviews that depend on this one.
    #[serde(default)]
    pub blocks: Vec<Link>,
    #[serde(default)]
    pub target_people: Vec<Link>,
    pub links: ReviewLinks,
}

impl ReviewRequest {
    pub fn is_submitted(&self) -> bool {
        self.status == ReviewStatus::Submitted
    }

    pub fn is_blocking(&self) -> bool {
        !self.blocks.is_empty()
    }
}

/// One uploaded diff revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub revision: Option<u32>,
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedReviewLinks {
    pub user: Link,
}

/// A review posted on a review request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedReview {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub links: PostedReviewLinks,
}

impl PostedReview {
    /// Username of the review author.
    pub fn author(&self) -> Option<&str> {
        self.links.user.title.as_deref()
    }
}

/// Entry of a review request's change description log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields_changed: Map<String, Value>,
}

impl ChangeLogEntry {
    pub fn touches(&self, field: &str) -> bool {
        self.fields_changed.contains_key(field)
    }
}

// Response envelopes.

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequestEnvelope {
    pub review_request: ReviewRequest,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequestList {
    pub review_requests: Vec<ReviewRequest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiffList {
    pub diffs: Vec<Diff>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostedReviewList {
    pub reviews: Vec<PostedReview>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangeList {
    pub changes: Vec<ChangeLogEntry>,
}

/// Serde adapter for API timestamps.
///
/// Accepts the documented `%Y-%m-%dT%H:%M:%SZ` form and falls back to
/// RFC 3339 for servers that add fractional seconds or an offset.
pub mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::TIMESTAMP_FORMAT;

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
            Ok(naive) => Ok(naive.and_utc()),
            Err(_) => DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)),
        }
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}
