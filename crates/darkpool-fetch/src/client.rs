use std::time::Duration;

use darkpool_core::config::FetchConfig;
use reqwest::Client;
use thiserror::Error;

/// Errors that stop a whole fetch run. Per-site failures are never errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("ads.txt directory not found: {0}")]
    MissingDirectory(String),
}

/// Longest transport error message kept on a failed site.
pub const MAX_ERROR_LENGTH: usize = 100;

/// Create the HTTP client shared by all site fetches.
pub fn create_client(config: &FetchConfig) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

/// Shorten an error message to [`MAX_ERROR_LENGTH`] characters.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(create_client(&FetchConfig::default()).is_ok());
    }

    #[test]
    fn test_truncate_error() {
        let long = "x".repeat(250);
        assert_eq!(truncate_error(&long).len(), 100);
        assert_eq!(truncate_error("short"), "short");
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let accented = "é".repeat(120);
        assert_eq!(truncate_error(&accented).chars().count(), 100);
    }
}
