//! ReviewBot Dispatch - delivering review ids to CI
//!
//! The verifier produces an ordered list of review ids. This crate hands
//! that list to whatever runs the builds:
//! - [`OutputSink::File`] writes the ids to a file for a downstream job
//! - [`OutputSink::JobQueue`] submits one Gearman build job per id

pub mod error;
pub mod gearman;
pub mod protocol;
pub mod sink;

pub use error::{DispatchError, Result};
pub use gearman::{
    parse_servers, GearmanClient, GearmanJob, GearmanServer, JobOutcome, JobReport,
    DEFAULT_GEARMAN_PORT,
};
pub use sink::{write_id_lines, Delivery, GearmanConfig, OutputSink, DEFAULT_GEARMAN_SERVERS};
