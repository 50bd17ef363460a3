//! Review Board connection settings

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Review Board instance used when none is configured
pub const DEFAULT_REVIEWBOARD_URL: &str = "https://reviews.apache.org";

/// Review Board configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewBoardConfig {
    /// Server URL, without the `/api` suffix
    pub url: String,
    /// Username for basic authentication; also the bot's review identity
    pub user: Option<String>,
    /// Password for basic authentication
    pub password: Option<String>,
    /// Per-request timeout in seconds (no timeout when unset)
    pub timeout_secs: Option<u64>,
}

impl Default for ReviewBoardConfig {
    fn default() -> Self {
        ReviewBoardConfig {
            url: std::env::var("REVIEWBOARD_URL")
                .unwrap_or_else(|_| DEFAULT_REVIEWBOARD_URL.to_string()),
            user: std::env::var("REVIEWBOARD_USER").ok(),
            password: std::env::var("REVIEWBOARD_PASSWORD").ok(),
            timeout_secs: None,
        }
    }
}

impl ReviewBoardConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create an anonymous config for a specific server
    pub fn new(url: &str) -> Self {
        ReviewBoardConfig {
            url: url.trim_end_matches('/').to_string(),
            user: None,
            password: None,
            timeout_secs: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Username, or an error naming the missing setting
    pub fn require_user(&self) -> Result<&str> {
        self.user
            .as_deref()
            .ok_or(ClientError::MissingSetting("REVIEWBOARD_USER"))
    }

    /// Server URL with any trailing slash removed
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl fmt::Debug for ReviewBoardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewBoardConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_has_url() {
        let config = ReviewBoardConfig::default();
        assert!(!config.url.is_empty());
    }

    #[test]
    fn test_config_new_trims_trailing_slash() {
        let config = ReviewBoardConfig::new("https://reviews.example.org/");
        assert_eq!(config.url, "https://reviews.example.org");
        assert_eq!(config.user, None);
    }

    #[test]
    fn test_config_with_credentials() {
        let config = ReviewBoardConfig::new("https://rb").with_credentials("bot", "secret");
        assert_eq!(config.require_user().unwrap(), "bot");
        assert_eq!(config.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_require_user_names_setting() {
        let err = ReviewBoardConfig::new("https://rb").require_user().unwrap_err();
        assert!(err.to_string().contains("REVIEWBOARD_USER"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = ReviewBoardConfig::new("https://rb").with_credentials("bot", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
