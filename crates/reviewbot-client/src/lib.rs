//! Review Board REST transport for ReviewBot.
//!
//! [`ReviewBoardClient`] implements [`reviewbot_core::ReviewApi`] over HTTPS
//! with basic authentication. Requests are never retried; failures surface
//! as [`reviewbot_core::FetchError`] so callers can tell a remote error from
//! a bad review.

pub mod client;
pub mod config;
pub mod error;

pub use client::ReviewBoardClient;
pub use config::{ReviewBoardConfig, DEFAULT_REVIEWBOARD_URL};
pub use error::{ClientError, Result};
