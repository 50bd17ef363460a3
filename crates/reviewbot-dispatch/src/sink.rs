//! Where the ordered review ids go once verification is done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reviewbot_core::ReviewId;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{DispatchError, Result};
use crate::gearman::{parse_servers, GearmanClient, GearmanJob, GearmanServer, JobReport};

pub const DEFAULT_GEARMAN_SERVERS: &str = "127.0.0.1";

/// Gearman job settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GearmanConfig {
    pub servers: Vec<GearmanServer>,
    /// Job name; the submitted task is `build:<job>`
    pub job: String,
    /// Extra parameters merged into every job's data
    pub params: Map<String, Value>,
    pub timeout: Option<Duration>,
}

impl GearmanConfig {
    pub fn new(servers: Vec<GearmanServer>, job: impl Into<String>) -> Self {
        Self {
            servers,
            job: job.into(),
            params: Map::new(),
            timeout: None,
        }
    }

    /// Build from command line text: a server list and optional JSON object.
    pub fn parse(servers: &str, job: &str, params: Option<&str>) -> Result<Self> {
        let mut config = Self::new(parse_servers(servers)?, job);
        if let Some(raw) = params {
            match serde_json::from_str::<Value>(raw)? {
                Value::Object(map) => config.params = map,
                other => {
                    return Err(DispatchError::InvalidParams(format!(
                        "expected a JSON object, got {other}"
                    )))
                }
            }
        }
        Ok(config)
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn task_name(&self) -> String {
        format!("build:{}", self.job)
    }

    /// Job for `review_id`, or a parameter-only job when `None`.
    pub fn build_job(&self, review_id: Option<&ReviewId>) -> Result<GearmanJob> {
        let mut data = Map::new();
        if let Some(id) = review_id {
            data.insert("REVIEW_ID".to_string(), serde_json::to_value(id)?);
        }
        data.insert(
            "OFFLINE_NODE_WHEN_COMPLETE".to_string(),
            Value::String("false".to_string()),
        );
        for (key, value) in &self.params {
            data.insert(key.clone(), value.clone());
        }
        let data = serde_json::to_string(&Value::Object(data))?;
        Ok(GearmanJob::new(self.task_name(), data))
    }

    pub fn client(&self) -> Result<GearmanClient> {
        Ok(GearmanClient::new(self.servers.clone())?.with_timeout(self.timeout))
    }

    /// Submit one job carrying only the parameters.
    pub async fn trigger(&self) -> Result<JobReport> {
        let client = self.client()?;
        let job = self.build_job(None)?;
        let mut reports = client.submit_all(vec![job]).await;
        reports
            .pop()
            .ok_or_else(|| DispatchError::Protocol("submission produced no report".to_string()))
    }
}

/// Output destination for a verified batch.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSink {
    File(PathBuf),
    JobQueue(GearmanConfig),
}

/// Result of delivering a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Written { path: PathBuf, count: usize },
    Submitted(Vec<JobReport>),
    Nothing,
}

impl OutputSink {
    pub async fn deliver(&self, review_ids: &[ReviewId]) -> Result<Delivery> {
        match self {
            OutputSink::File(path) => {
                write_id_list(path, review_ids).await?;
                info!(path = %path.display(), count = review_ids.len(), "review ids written");
                Ok(Delivery::Written {
                    path: path.clone(),
                    count: review_ids.len(),
                })
            }
            OutputSink::JobQueue(config) => {
                if review_ids.is_empty() {
                    info!("no review requests to trigger");
                    return Ok(Delivery::Nothing);
                }
                let client = config.client()?;
                let jobs = review_ids
                    .iter()
                    .map(|id| config.build_job(Some(id)))
                    .collect::<Result<Vec<_>>>()?;
                info!(task = %config.task_name(), jobs = jobs.len(), "submitting build jobs");
                Ok(Delivery::Submitted(client.submit_all(jobs).await))
            }
        }
    }
}

/// Ids separated by newlines, no trailing newline.
async fn write_id_list(path: &Path, review_ids: &[ReviewId]) -> Result<()> {
    let body = review_ids
        .iter()
        .map(ReviewId::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// One id per line, each terminated by a newline.
pub async fn write_id_lines(path: &Path, review_ids: &[ReviewId]) -> Result<()> {
    let body: String = review_ids
        .iter()
        .map(|id| format!("{id}\n"))
        .collect();
    tokio::fs::write(path, body).await?;
    Ok(())
}
