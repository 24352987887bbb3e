//! Error types for the GitHub Projects client.

use std::time::Duration;
use thiserror::Error;

/// Failures raised by the transport or reported by the GitHub API.
///
/// Every error that leaves the client for a network or API reason is one of
/// these. The message of the underlying cause is carried verbatim.
#[derive(Debug, Error)]
pub enum GitHubClientError {
    /// Missing, expired or otherwise rejected token.
    #[error("GitHub authentication failed: {0}")]
    Authentication(String),

    /// The token is valid but lacks access to the resource.
    #[error("GitHub denied access: {0}")]
    Forbidden(String),

    /// The API could not resolve the requested object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed document or unknown field, passed through for diagnostics.
    #[error("GraphQL schema error: {0}")]
    Schema(String),

    /// Any other error reported in the GraphQL `errors` array.
    #[error("GitHub API error: {0}")]
    Api(String),

    /// Primary or secondary rate limit hit.
    #[error("Rate limited by GitHub, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection, timeout or unexpected HTTP status.
    #[error("Network error: {0}")]
    Network(String),

    /// The HTTP client rejected the request itself: bad URL, builder or
    /// redirect failure, undecodable body. Never retried.
    #[error("HTTP client error: {0}")]
    Http(String),

    /// A transient failure persisted past the retry bound.
    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GitHubClientError>,
    },

    /// The response did not contain the field the operation needs.
    #[error("Missing data in GitHub response: {0}")]
    MissingData(String),

    /// The response could not be decoded into the expected shape.
    #[error("Failed to decode GitHub response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GitHubClientError {
    /// Whether the transport may retry the request that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }
}

impl From<reqwest::Error> for GitHubClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Network(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Error returned by every client operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller precondition violated; detected before any network call.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Client(#[from] GitHubClientError),
}

impl Error {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
