//! Configuration for the GitHub Projects client.

use std::env;
use std::time::Duration;

/// Default GitHub GraphQL endpoint.
pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Client configuration, read from the environment.
#[derive(Clone)]
pub struct Config {
    /// Bearer token used for every request.
    pub token: Option<String>,
    /// GraphQL endpoint.
    pub api_url: String,
    /// How many times a transient failure is retried.
    pub max_retries: u32,
    /// First backoff delay; doubled after each attempt.
    pub retry_base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub retry_max_delay: Duration,
    /// Per request timeout.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty()),
            api_url: env::var("GITHUB_GRAPHQL_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| GITHUB_GRAPHQL_URL.to_string()),
            max_retries: env::var("GITHUB_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            retry_base_delay: Duration::from_millis(
                env::var("GITHUB_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            retry_max_delay: Duration::from_secs(8),
            request_timeout: Duration::from_secs(
                env::var("GITHUB_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

impl Config {
    /// Configuration with an explicit token and endpoint, other values from the environment.
    pub fn with_token(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Backoff delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("api_url", &self.api_url)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
