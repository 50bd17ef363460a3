//! ReviewBot CLI
//!
//! The `reviewbot` command decides which Review Board requests need a CI
//! build and hands them to the build system.
//!
//! ## Commands
//!
//! - `verify`: find stale review requests and emit their build sets
//! - `review-ids`: write the build set of a single review request
//! - `post-result`: post a build result on a review request
//! - `trigger`: submit a single Gearman build job

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use reviewbot_client::{ReviewBoardClient, ReviewBoardConfig, DEFAULT_REVIEWBOARD_URL};
use reviewbot_core::{
    fetch_review_request, publish_build_result, BatchOutcome, DependencyResolver, ReviewApi,
    ReviewBoardReporter, Verifier, VerifyConfig, DEFAULT_QUERY,
};
use reviewbot_dispatch::{
    write_id_lines, Delivery, GearmanConfig, JobOutcome, OutputSink, DEFAULT_GEARMAN_SERVERS,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "reviewbot")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Review verification bot for Review Board", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Review Board connection flags
#[derive(Args, Debug, Clone)]
struct ReviewBoardArgs {
    /// Review Board URL
    #[arg(long, env = "REVIEWBOARD_URL", default_value = DEFAULT_REVIEWBOARD_URL)]
    url: String,

    /// Review Board user; also the identity whose reviews mark a request verified
    #[arg(long, env = "REVIEWBOARD_USER")]
    user: Option<String>,

    /// Review Board password
    #[arg(long, env = "REVIEWBOARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request HTTP timeout in seconds
    #[arg(long)]
    http_timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify pending review requests and emit the reviews to build
    Verify {
        #[command(flatten)]
        board: ReviewBoardArgs,

        /// Maximum number of review requests to verify (-1 for no limit)
        #[arg(short = 'r', long = "reviews", default_value_t = -1, allow_negative_numbers = true)]
        reviews: i64,

        /// Review request query string
        #[arg(short, long, default_value = DEFAULT_QUERY)]
        query: String,

        #[command(subcommand)]
        output: OutputCommand,
    },

    /// Write the ordered build set of one review request, one id per line
    ReviewIds {
        #[command(flatten)]
        board: ReviewBoardArgs,

        /// Review request id
        #[arg(short, long)]
        review_id: String,

        /// Output file
        #[arg(short, long)]
        out_file: PathBuf,
    },

    /// Post a build result on a review request
    PostResult {
        #[command(flatten)]
        board: ReviewBoardArgs,

        /// Review request id
        #[arg(short, long)]
        review_id: String,

        /// Result message
        #[arg(short, long)]
        message: String,

        /// Build logs URL
        #[arg(short, long)]
        logs_url: String,
    },

    /// Submit a single build job
    Trigger {
        #[command(flatten)]
        gearman: GearmanArgs,
    },
}

/// Where `verify` sends the review ids
#[derive(Subcommand, Debug)]
enum OutputCommand {
    /// Write the ids to a file
    File {
        /// Output file
        #[arg(short, long)]
        out_file: PathBuf,
    },

    /// Submit one Gearman job per id
    Gearman {
        #[command(flatten)]
        gearman: GearmanArgs,
    },
}

/// Gearman job flags
#[derive(Args, Debug, Clone)]
struct GearmanArgs {
    /// Comma-separated host[:port] list
    #[arg(short, long, default_value = DEFAULT_GEARMAN_SERVERS)]
    servers: String,

    /// Job name; submitted as build:<job>
    #[arg(short, long)]
    job: String,

    /// Extra job parameters as a JSON object
    #[arg(long)]
    params: Option<String>,

    /// Seconds to wait for jobs to finish
    #[arg(long)]
    timeout: Option<u64>,
}

impl GearmanArgs {
    fn config(&self) -> Result<GearmanConfig> {
        let config = GearmanConfig::parse(&self.servers, &self.job, self.params.as_deref())
            .context("Invalid gearman settings")?;
        Ok(config.with_timeout(self.timeout.map(Duration::from_secs)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reviewbot_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Verify {
            board,
            reviews,
            query,
            output,
        } => cmd_verify(&board, review_limit(reviews), &query, output_sink(output)?).await,
        Commands::ReviewIds {
            board,
            review_id,
            out_file,
        } => cmd_review_ids(&board, &review_id, &out_file).await,
        Commands::PostResult {
            board,
            review_id,
            message,
            logs_url,
        } => cmd_post_result(&board, &review_id, &message, &logs_url).await,
        Commands::Trigger { gearman } => cmd_trigger(&gearman).await,
    }
}

/// Negative counts mean no limit.
fn review_limit(reviews: i64) -> Option<usize> {
    usize::try_from(reviews).ok()
}

fn output_sink(output: OutputCommand) -> Result<OutputSink> {
    Ok(match output {
        OutputCommand::File { out_file } => OutputSink::File(out_file),
        OutputCommand::Gearman { gearman } => OutputSink::JobQueue(gearman.config()?),
    })
}

fn connect(board: &ReviewBoardArgs) -> Result<Arc<ReviewBoardClient>> {
    let mut config = ReviewBoardConfig::new(&board.url);
    config.user = board.user.clone();
    config.password = board.password.clone();
    config.timeout_secs = board.http_timeout;
    let client = ReviewBoardClient::new(config).context("Failed to create Review Board client")?;
    Ok(Arc::new(client))
}

/// Verify review requests matching a query and deliver the build sets
async fn cmd_verify(
    board: &ReviewBoardArgs,
    limit: Option<usize>,
    query: &str,
    sink: OutputSink,
) -> Result<()> {
    let client = connect(board)?;
    let identity = client
        .config()
        .require_user()
        .context("verify needs the bot's Review Board user")?
        .to_string();
    let query_url = client.review_requests_url(query);

    let config = VerifyConfig::new(identity).with_limit(limit);
    let (outcome, delivery) = verify_and_deliver(client, config, &query_url, &sink).await?;

    println!(
        "Verified {} review request(s), rejected {}, skipped {}",
        outcome.accepted.len(),
        outcome.rejected.len(),
        outcome.skipped.len()
    );
    print_delivery(&delivery);
    Ok(())
}

async fn verify_and_deliver(
    api: Arc<dyn ReviewApi>,
    config: VerifyConfig,
    query_url: &str,
    sink: &OutputSink,
) -> Result<(BatchOutcome, Delivery)> {
    let reporter = Arc::new(ReviewBoardReporter::new(api.clone()));
    let verifier = Verifier::new(api, reporter, config);

    let outcome = verifier
        .verify_query(query_url)
        .await
        .context("Failed to fetch review requests")?;
    info!(review_ids = ?outcome.review_ids, "verification finished");

    let delivery = sink
        .deliver(&outcome.review_ids)
        .await
        .context("Failed to deliver review ids")?;
    Ok((outcome, delivery))
}

fn print_delivery(delivery: &Delivery) {
    match delivery {
        Delivery::Written { path, count } => {
            println!("Wrote {} review id(s) to {}", count, path.display())
        }
        Delivery::Submitted(reports) => {
            for report in reports {
                let status = match &report.outcome {
                    JobOutcome::Finished { .. } => "finished",
                    JobOutcome::Failed => "failed",
                    JobOutcome::Exception { .. } => "exception",
                    JobOutcome::ServerError { .. } => "server error",
                    JobOutcome::TimedOut => "timed out",
                    JobOutcome::ConnectionFailed { .. } => "connection failed",
                };
                println!("{} {} {}", report.job.task, report.job.unique, status);
            }
        }
        Delivery::Nothing => println!("No review requests to build"),
    }
}

/// Write the build set of one review request
async fn cmd_review_ids(board: &ReviewBoardArgs, review_id: &str, out_file: &Path) -> Result<()> {
    let client = connect(board)?;
    let url = client.review_request_url(review_id);
    let ids = resolve_to_file(client.as_ref(), &url, out_file).await?;
    println!("Review ids: {}", ids.join(" "));
    Ok(())
}

async fn resolve_to_file(api: &dyn ReviewApi, url: &str, out_file: &Path) -> Result<Vec<String>> {
    let review = fetch_review_request(api, url)
        .await
        .context(format!("Failed to fetch review request {url}"))?;
    let build_set = DependencyResolver::new(api)
        .resolve(&review)
        .await
        .context(format!("Failed to resolve dependencies of review {}", review.id))?;
    write_id_lines(out_file, &build_set)
        .await
        .context(format!("Failed to write {}", out_file.display()))?;
    Ok(build_set.iter().map(ToString::to_string).collect())
}

/// Post a build result on a review request
async fn cmd_post_result(
    board: &ReviewBoardArgs,
    review_id: &str,
    message: &str,
    logs_url: &str,
) -> Result<()> {
    let client = connect(board)?;
    client
        .config()
        .require_user()
        .context("post-result needs a Review Board user")?;

    let api: Arc<dyn ReviewApi> = client.clone();
    let review = fetch_review_request(api.as_ref(), &client.review_request_url(review_id))
        .await
        .context(format!("Failed to fetch review request {review_id}"))?;
    let reporter = ReviewBoardReporter::new(api.clone());
    publish_build_result(api.as_ref(), &reporter, &review, message, logs_url)
        .await
        .context("Failed to post build result")?;

    println!("Posted result on {}", client.review_page_url(review_id));
    Ok(())
}

/// Submit a single build job
async fn cmd_trigger(gearman: &GearmanArgs) -> Result<()> {
    let report = gearman
        .config()?
        .trigger()
        .await
        .context("Failed to trigger job")?;
    print_delivery(&Delivery::Submitted(vec![report]));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reviewbot_core::fakes::{review_url, FakeReview, MemoryReviewApi, FAKE_BASE_URL};
    use reviewbot_core::ReviewId;
    use serde_json::json;

    #[test]
    fn test_verify_defaults() {
        let cli = Cli::try_parse_from([
            "reviewbot", "verify", "--url", "https://rb.example.org", "file", "-o", "ids",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify {
                board,
                reviews,
                query,
                output,
            } => {
                assert_eq!(board.url, "https://rb.example.org");
                assert_eq!(reviews, -1);
                assert_eq!(query, DEFAULT_QUERY);
                assert!(matches!(output, OutputCommand::File { out_file } if out_file == Path::new("ids")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_verify_gearman_output() {
        let cli = Cli::try_parse_from([
            "reviewbot",
            "--json",
            "verify",
            "-r",
            "3",
            "gearman",
            "-s",
            "ci1:4731,ci2",
            "-j",
            "mesos-reviewbot",
            "--params",
            r#"{"BRANCH":"master"}"#,
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Verify { reviews, output, .. } = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(review_limit(reviews), Some(3));

        let OutputSink::JobQueue(config) = output_sink(output).unwrap() else {
            panic!("expected job queue sink");
        };
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.task_name(), "build:mesos-reviewbot");
        assert_eq!(config.params["BRANCH"], "master");
    }

    #[test]
    fn test_negative_review_count_accepted() {
        let cli =
            Cli::try_parse_from(["reviewbot", "verify", "-r", "-1", "file", "-o", "ids"]).unwrap();
        let Commands::Verify { reviews, .. } = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(review_limit(reviews), None);
        assert_eq!(review_limit(0), Some(0));
    }

    #[test]
    fn test_gearman_requires_job() {
        assert!(Cli::try_parse_from(["reviewbot", "trigger"]).is_err());
        assert!(Cli::try_parse_from(["reviewbot", "trigger", "-j", "tidybot"]).is_ok());
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let output = OutputCommand::Gearman {
            gearman: GearmanArgs {
                servers: DEFAULT_GEARMAN_SERVERS.to_string(),
                job: "job".to_string(),
                params: Some("[]".to_string()),
                timeout: None,
            },
        };
        assert!(output_sink(output).is_err());
    }

    #[tokio::test]
    async fn test_verify_and_deliver_writes_build_sets() {
        let api = Arc::new(MemoryReviewApi::new());
        let reviews = [
            FakeReview::new(300)
                .diff("2017-01-01T00:00:10Z")
                .depends_on(&[301]),
            FakeReview::new(301).diff("2017-01-01T00:00:10Z"),
        ];
        for review in &reviews {
            api.add(review);
        }
        let query_url = format!("{FAKE_BASE_URL}/api/review-requests/?status=pending");
        api.insert(
            query_url.clone(),
            json!({ "review_requests": [reviews[0].to_json()] }),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("review_ids");
        let (outcome, delivery) = verify_and_deliver(
            api,
            VerifyConfig::new("mesos-review"),
            &query_url,
            &OutputSink::File(path.clone()),
        )
        .await
        .unwrap();

        assert_eq!(outcome.review_ids, vec![ReviewId::from(301), ReviewId::from(300)]);
        assert_eq!(delivery, Delivery::Written { path: path.clone(), count: 2 });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "301\n300");
    }

    #[tokio::test]
    async fn test_resolve_to_file() {
        let api = MemoryReviewApi::new();
        api.add(&FakeReview::new(10).depends_on(&[11, 12]));
        api.add(&FakeReview::new(11));
        api.add(&FakeReview::new(12).submitted());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids");
        let ids = resolve_to_file(&api, &review_url(10), &path).await.unwrap();

        assert_eq!(ids, vec!["11", "10"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "11\n10\n");
    }

    #[tokio::test]
    async fn test_resolve_to_file_reports_cycle() {
        let api = MemoryReviewApi::new();
        api.add(&FakeReview::new(1).depends_on(&[2]));
        api.add(&FakeReview::new(2).depends_on(&[1]));

        let dir = tempfile::tempdir().unwrap();
        let err = resolve_to_file(&api, &review_url(1), &dir.path().join("ids"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Circular dependency"));
    }
}
