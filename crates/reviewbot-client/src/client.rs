//! HTTP client for the Review Board web API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response, Url};
use reviewbot_core::{FetchError, FetchResult, ReviewApi};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ReviewBoardConfig;
use crate::error::{ClientError, Result};

/// Review Board client
pub struct ReviewBoardClient {
    config: ReviewBoardConfig,
    http_client: reqwest::Client,
}

impl ReviewBoardClient {
    /// Create a new client
    pub fn new(config: ReviewBoardConfig) -> Result<Self> {
        Url::parse(config.base_url()).map_err(|e| ClientError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("reviewbot/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http_client = builder.build()?;

        Ok(ReviewBoardClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ReviewBoardConfig::from_env())
    }

    pub fn config(&self) -> &ReviewBoardConfig {
        &self.config
    }

    /// API resource URL of a single review request
    pub fn review_request_url(&self, review_id: &str) -> String {
        format!("{}/api/review-requests/{}/", self.config.base_url(), review_id)
    }

    /// API listing URL for a review request query such as `?status=pending`
    pub fn review_requests_url(&self, query: &str) -> String {
        format!("{}/api/review-requests/{}", self.config.base_url(), query)
    }

    /// Human-facing page of a review request
    pub fn review_page_url(&self, review_id: &str) -> String {
        format!("{}/r/{}", self.config.base_url(), review_id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.user {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> FetchResult<Value> {
        let response = self
            .authorize(request)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Self::decode(url, response).await
    }

    async fn decode(url: &str, response: Response) -> FetchResult<Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = status.as_u16(), "Review Board request failed");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::InvalidBody {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl ReviewApi for ReviewBoardClient {
    async fn fetch(&self, url: &str) -> FetchResult<Value> {
        debug!(url = %url, "GET");
        self.send(url, self.http_client.get(url)).await
    }

    async fn post(&self, url: &str, form: &[(&str, &str)]) -> FetchResult<Value> {
        debug!(url = %url, "POST");
        self.send(url, self.http_client.post(url).form(form)).await
    }
}
