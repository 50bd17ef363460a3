//! Gearman job submission.
//!
//! One connection per job. Jobs are spread over the configured servers
//! round-robin; when a server refuses the connection the next one is tried.
//! Submission stays open until the worker reports a final status or the
//! optional timeout expires.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::protocol::{read_packet, write_packet, Magic, Packet, PacketType};

pub const DEFAULT_GEARMAN_PORT: u16 = 4730;

/// A `host:port` Gearman server address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GearmanServer {
    pub host: String,
    pub port: u16,
}

impl GearmanServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for GearmanServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for GearmanServer {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DispatchError::InvalidServer(s.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_GEARMAN_PORT),
        };
        if host.is_empty() {
            return Err(DispatchError::InvalidServer(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

/// Parse a comma-separated `host[:port]` list. Empty entries are ignored.
pub fn parse_servers(list: &str) -> Result<Vec<GearmanServer>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(GearmanServer::from_str)
        .collect()
}

/// A job ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GearmanJob {
    /// Function name registered by the workers, e.g. `build:mesos-reviewbot`
    pub task: String,
    pub unique: String,
    /// JSON encoded job parameters
    pub data: String,
}

impl GearmanJob {
    pub fn new(task: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            unique: Uuid::new_v4().simple().to_string(),
            data: data.into(),
        }
    }
}

/// Final state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The worker completed the job
    Finished { result: String },
    /// The worker reported failure
    Failed,
    /// The worker raised an exception
    Exception { message: String },
    /// The server answered with an ERROR packet
    ServerError { code: String, message: String },
    /// No final status before the timeout
    TimedOut,
    /// No server accepted the job, or the connection dropped
    ConnectionFailed { error: String },
}

impl JobOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobOutcome::Finished { .. })
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: GearmanJob,
    /// Server the job was submitted to, if any accepted it
    pub server: Option<GearmanServer>,
    /// Handle assigned by the server
    pub handle: Option<String>,
    pub outcome: JobOutcome,
}

/// Client submitting jobs to a pool of Gearman servers.
#[derive(Debug, Clone)]
pub struct GearmanClient {
    servers: Arc<Vec<GearmanServer>>,
    timeout: Option<Duration>,
}

impl GearmanClient {
    pub fn new(servers: Vec<GearmanServer>) -> Result<Self> {
        if servers.is_empty() {
            return Err(DispatchError::NoServers);
        }
        Ok(Self {
            servers: Arc::new(servers),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn servers(&self) -> &[GearmanServer] {
        &self.servers
    }

    /// Submit all jobs concurrently and wait for every one to settle.
    ///
    /// Reports are returned in submission order.
    pub async fn submit_all(&self, jobs: Vec<GearmanJob>) -> Vec<JobReport> {
        let total = jobs.len();
        let mut set = JoinSet::new();
        for (idx, job) in jobs.into_iter().enumerate() {
            let servers = Arc::clone(&self.servers);
            let timeout = self.timeout;
            set.spawn(async move { (idx, submit_one(&servers, idx, job, timeout).await) });
        }

        let mut indexed: Vec<(usize, JobReport)> = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(e) => warn!(error = %e, "gearman submission task panicked"),
            }
        }
        indexed.sort_by_key(|(idx, _)| *idx);

        let reports: Vec<JobReport> = indexed.into_iter().map(|(_, r)| r).collect();
        for report in &reports {
            log_outcome(report);
        }
        reports
    }
}

/// Try servers starting at `start`, moving on only when a connection fails.
async fn submit_one(
    servers: &[GearmanServer],
    start: usize,
    job: GearmanJob,
    timeout: Option<Duration>,
) -> JobReport {
    let mut last_error = String::from("no servers");
    for offset in 0..servers.len() {
        let server = &servers[(start + offset) % servers.len()];
        let stream = match TcpStream::connect((server.host.as_str(), server.port)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(server = %server, error = %e, "gearman server unavailable");
                last_error = format!("{server}: {e}");
                continue;
            }
        };

        let mut handle = None;
        let attempt = run_job(stream, &job, &mut handle);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => JobOutcome::TimedOut,
            },
            None => attempt.await,
        };
        return JobReport {
            job,
            server: Some(server.clone()),
            handle,
            outcome,
        };
    }

    JobReport {
        job,
        server: None,
        handle: None,
        outcome: JobOutcome::ConnectionFailed { error: last_error },
    }
}

async fn run_job(
    mut stream: TcpStream,
    job: &GearmanJob,
    handle: &mut Option<String>,
) -> JobOutcome {
    match exchange(&mut stream, job, handle).await {
        Ok(outcome) => outcome,
        Err(e) => JobOutcome::ConnectionFailed {
            error: e.to_string(),
        },
    }
}

async fn exchange(
    stream: &mut TcpStream,
    job: &GearmanJob,
    handle: &mut Option<String>,
) -> Result<JobOutcome> {
    let submit = Packet::new(
        PacketType::SubmitJob,
        &[
            job.task.as_bytes(),
            job.unique.as_bytes(),
            job.data.as_bytes(),
        ],
    );
    write_packet(stream, &submit, Magic::Request).await?;

    loop {
        let packet = read_packet(stream, Magic::Response).await?;
        match packet.kind {
            PacketType::JobCreated => {
                let assigned = packet.arg_str(0);
                debug!(task = %job.task, handle = %assigned, "job created");
                *handle = Some(assigned);
            }
            PacketType::WorkStatus => {
                debug!(
                    handle = %packet.arg_str(0),
                    numerator = %packet.arg_str(1),
                    denominator = %packet.arg_str(2),
                    "job status"
                );
            }
            PacketType::WorkData | PacketType::WorkWarning => {
                debug!(handle = %packet.arg_str(0), data = %packet.arg_str(1), "job data");
            }
            PacketType::WorkComplete => {
                return Ok(JobOutcome::Finished {
                    result: packet.arg_str(1),
                })
            }
            PacketType::WorkFail => return Ok(JobOutcome::Failed),
            PacketType::WorkException => {
                return Ok(JobOutcome::Exception {
                    message: packet.arg_str(1),
                })
            }
            PacketType::Error => {
                return Ok(JobOutcome::ServerError {
                    code: packet.arg_str(0),
                    message: packet.arg_str(1),
                })
            }
            PacketType::SubmitJob => {
                return Err(DispatchError::Protocol(
                    "server sent SUBMIT_JOB".to_string(),
                ))
            }
        }
    }
}

fn log_outcome(report: &JobReport) {
    let unique = &report.job.unique;
    match &report.outcome {
        JobOutcome::Finished { result } => {
            info!(task = %report.job.task, unique = %unique, result = %result, "job finished")
        }
        JobOutcome::Failed => warn!(task = %report.job.task, unique = %unique, "job failed"),
        JobOutcome::Exception { message } => {
            warn!(task = %report.job.task, unique = %unique, message = %message, "job raised an exception")
        }
        JobOutcome::ServerError { code, message } => {
            warn!(task = %report.job.task, unique = %unique, code = %code, message = %message, "gearman server error")
        }
        JobOutcome::TimedOut => warn!(task = %report.job.task, unique = %unique, "job timed out"),
        JobOutcome::ConnectionFailed { error } => {
            warn!(task = %report.job.task, unique = %unique, error = %error, "job connection failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_with_port() {
        let server: GearmanServer = "gearman.example.org:4731".parse().unwrap();
        assert_eq!(server, GearmanServer::new("gearman.example.org", 4731));
    }

    #[test]
    fn test_server_default_port() {
        let server: GearmanServer = " 127.0.0.1 ".parse().unwrap();
        assert_eq!(server.port, DEFAULT_GEARMAN_PORT);
        assert_eq!(server.to_string(), "127.0.0.1:4730");
    }

    #[test]
    fn test_server_bad_port() {
        assert!(matches!(
            "host:notaport".parse::<GearmanServer>(),
            Err(DispatchError::InvalidServer(_))
        ));
        assert!(":4730".parse::<GearmanServer>().is_err());
    }

    #[test]
    fn test_parse_servers_list() {
        let servers = parse_servers("a:1, b ,,c:3").unwrap();
        assert_eq!(
            servers,
            vec![
                GearmanServer::new("a", 1),
                GearmanServer::new("b", DEFAULT_GEARMAN_PORT),
                GearmanServer::new("c", 3),
            ]
        );
        assert!(parse_servers("").unwrap().is_empty());
    }

    #[test]
    fn test_client_requires_servers() {
        assert!(matches!(
            GearmanClient::new(Vec::new()),
            Err(DispatchError::NoServers)
        ));
    }

    #[test]
    fn test_job_unique_ids_are_hex() {
        let a = GearmanJob::new("build:x", "{}");
        let b = GearmanJob::new("build:x", "{}");
        assert_eq!(a.unique.len(), 32);
        assert!(a.unique.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.unique, b.unique);
    }

    #[tokio::test]
    async fn test_unreachable_servers_report_connection_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = GearmanClient::new(vec![GearmanServer::new("127.0.0.1", port)]).unwrap();
        let reports = client.submit_all(vec![GearmanJob::new("build:x", "{}")]).await;

        assert_eq!(reports.len(), 1);
        assert!(reports[0].server.is_none());
        assert!(matches!(
            reports[0].outcome,
            JobOutcome::ConnectionFailed { .. }
        ));
    }
}
