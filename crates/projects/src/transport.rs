//! GraphQL transport for the GitHub API.
//!
//! [`HttpTransport`] posts one document per call with bearer authentication,
//! retries transient failures with exponential backoff and classifies the
//! rest into [`GitHubClientError`] kinds. Callers pull the field they need
//! out of the returned [`GraphqlResponse`] with [`GraphqlResponse::required`],
//! which is where the partial-success rule is enforced.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::GitHubClientError;

/// Executes GraphQL documents against an endpoint.
///
/// Implementations must be safe to share between concurrent operations.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    async fn execute(
        &self,
        document: &str,
        variables: Value,
    ) -> Result<GraphqlResponse, GitHubClientError>;
}

/// GraphQL request body
#[derive(Debug, Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: &'a Value,
}

/// Decoded GraphQL response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// A single entry of the GraphQL `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub path: Option<Vec<Value>>,
    #[serde(default)]
    pub extensions: Option<Value>,
}

impl GraphqlResponse {
    /// Successful response carrying `data`.
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Extract and decode the value at `pointer` (JSON pointer into `data`).
    ///
    /// A response with `errors` still succeeds when the requested value is
    /// present and non-null. Otherwise the errors are classified and returned.
    pub fn required<T: DeserializeOwned>(self, pointer: &str) -> Result<T, GitHubClientError> {
        let found = self
            .data
            .as_ref()
            .and_then(|data| data.pointer(pointer))
            .filter(|value| !value.is_null())
            .cloned();

        match found {
            Some(value) => {
                if !self.errors.is_empty() {
                    warn!(
                        pointer,
                        errors = %join_messages(&self.errors),
                        "Partial GraphQL response; required field present"
                    );
                }
                Ok(serde_json::from_value(value)?)
            }
            None if !self.errors.is_empty() => Err(classify(&self.errors)),
            None => Err(GitHubClientError::MissingData(pointer.to_string())),
        }
    }
}

fn join_messages(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Map GraphQL `errors` onto a single client error kind.
pub(crate) fn classify(errors: &[GraphqlError]) -> GitHubClientError {
    let message = join_messages(errors);
    let has_type = |t: &str| errors.iter().any(|e| e.error_type.as_deref() == Some(t));

    if has_type("RATE_LIMITED") {
        return GitHubClientError::RateLimited { retry_after: None };
    }
    if has_type("NOT_FOUND") {
        return GitHubClientError::NotFound(message);
    }
    if has_type("FORBIDDEN") || has_type("INSUFFICIENT_SCOPES") {
        return GitHubClientError::Forbidden(message);
    }

    // Validation failures carry an extensions.code and never a type/path.
    let is_schema = errors.iter().any(|e| {
        e.extensions
            .as_ref()
            .and_then(|ext| ext.get("code"))
            .is_some()
            || (e.error_type.is_none() && e.path.is_none())
    });
    if is_schema {
        GitHubClientError::Schema(message)
    } else {
        GitHubClientError::Api(message)
    }
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Config,
}

impl HttpTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    /// Returns `Authentication` when no token is configured, `Http` when the
    /// HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, GitHubClientError> {
        let token = config.token.as_deref().ok_or_else(|| {
            GitHubClientError::Authentication("GITHUB_TOKEN is not set".to_string())
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                GitHubClientError::Authentication("token contains invalid characters".to_string())
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("github-projects-mcp/1.0"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    async fn send_once(
        &self,
        document: &str,
        variables: &Value,
    ) -> Result<GraphqlResponse, GitHubClientError> {
        let request = GraphqlRequest {
            query: document,
            variables,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(response).await);
        }

        let body = response.text().await?;
        let decoded: GraphqlResponse = serde_json::from_str(&body)?;

        let data_missing = decoded.data.as_ref().map_or(true, Value::is_null);
        if data_missing
            && decoded
                .errors
                .iter()
                .any(|e| e.error_type.as_deref() == Some("RATE_LIMITED"))
        {
            return Err(GitHubClientError::RateLimited { retry_after: None });
        }

        Ok(decoded)
    }

    async fn status_error(response: Response) -> GitHubClientError {
        let status = response.status();
        let retry_after = rate_limit_delay(&response);
        let rate_limit_exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok())
            == Some("0");
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED => GitHubClientError::Authentication(api_message(&body)),
            StatusCode::TOO_MANY_REQUESTS => GitHubClientError::RateLimited { retry_after },
            StatusCode::FORBIDDEN
                if rate_limit_exhausted
                    || retry_after.is_some()
                    || body.to_lowercase().contains("rate limit") =>
            {
                GitHubClientError::RateLimited { retry_after }
            }
            StatusCode::FORBIDDEN => GitHubClientError::Forbidden(api_message(&body)),
            s if s.is_server_error() => GitHubClientError::Network(format!("HTTP {s}")),
            s => GitHubClientError::Api(format!("HTTP {s}: {}", api_message(&body))),
        }
    }
}

/// Pull `message` out of a REST-style error body, falling back to the raw body.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Delay requested by `retry-after` or implied by `x-ratelimit-reset`.
fn rate_limit_delay(response: &Response) -> Option<Duration> {
    let headers = response.headers();
    if let Some(secs) = headers
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }

    headers
        .get("x-ratelimit-reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .map(|reset| {
            let now = chrono::Utc::now().timestamp();
            #[allow(clippy::cast_sign_loss)]
            let secs = (reset - now).max(0) as u64;
            Duration::from_secs(secs)
        })
}

#[async_trait]
impl GraphqlTransport for HttpTransport {
    #[instrument(skip(self, document, variables))]
    async fn execute(
        &self,
        document: &str,
        variables: Value,
    ) -> Result<GraphqlResponse, GitHubClientError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(document, &variables).await {
                Ok(response) => {
                    debug!(attempt, errors = response.errors.len(), "GraphQL request completed");
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt <= self.config.max_retries => {
                    let requested = match &e {
                        GitHubClientError::RateLimited { retry_after } => *retry_after,
                        _ => None,
                    };
                    let delay = requested
                        .unwrap_or_else(|| self.config.backoff(attempt))
                        .min(self.config.retry_max_delay);
                    warn!(
                        error = %e,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Transient GitHub failure, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(GitHubClientError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> GraphqlResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_required_returns_nested_value() {
        let resp = response(json!({"data": {"repository": {"id": "R_1"}}}));
        let id: String = resp.required("/repository/id").unwrap();
        assert_eq!(id, "R_1");
    }

    #[test]
    fn test_partial_success_with_field_present() {
        let resp = response(json!({
            "data": {"repository": {"id": "R_1", "issue": null}},
            "errors": [{"type": "NOT_FOUND", "path": ["repository", "issue"], "message": "Could not resolve to an Issue"}]
        }));
        let id: String = resp.required("/repository/id").unwrap();
        assert_eq!(id, "R_1");
    }

    #[test]
    fn test_partial_success_with_field_null_fails() {
        let resp = response(json!({
            "data": {"repository": {"id": "R_1", "issue": null}},
            "errors": [{"type": "NOT_FOUND", "path": ["repository", "issue"], "message": "Could not resolve to an Issue with the number of 99."}]
        }));
        let err = resp.required::<Value>("/repository/issue").unwrap_err();
        assert!(matches!(err, GitHubClientError::NotFound(m) if m.contains("number of 99")));
    }

    #[test]
    fn test_missing_data_without_errors() {
        let resp = response(json!({"data": {"repository": null}}));
        let err = resp.required::<Value>("/repository").unwrap_err();
        assert!(matches!(err, GitHubClientError::MissingData(p) if p == "/repository"));
    }

    #[test]
    fn test_classify_schema_error() {
        let errors: Vec<GraphqlError> = serde_json::from_value(json!([{
            "message": "Field 'bogus' doesn't exist on type 'Repository'",
            "locations": [{"line": 1, "column": 30}],
            "extensions": {"code": "undefinedField", "typeName": "Repository", "fieldName": "bogus"}
        }]))
        .unwrap();
        assert!(matches!(
            classify(&errors),
            GitHubClientError::Schema(m) if m == "Field 'bogus' doesn't exist on type 'Repository'"
        ));
    }

    #[test]
    fn test_classify_forbidden_and_generic() {
        let forbidden: Vec<GraphqlError> = serde_json::from_value(json!([
            {"type": "FORBIDDEN", "path": ["addProjectV2ItemById"], "message": "Resource not accessible by integration"}
        ]))
        .unwrap();
        assert!(matches!(classify(&forbidden), GitHubClientError::Forbidden(_)));

        let generic: Vec<GraphqlError> = serde_json::from_value(json!([
            {"type": "UNPROCESSABLE", "path": ["createIssue"], "message": "Title can't be blank"}
        ]))
        .unwrap();
        assert!(matches!(classify(&generic), GitHubClientError::Api(m) if m == "Title can't be blank"));
    }

    #[test]
    fn test_transport_requires_token() {
        let config = Config {
            token: None,
            ..Config::with_token("x", "http://localhost")
        };
        assert!(matches!(
            HttpTransport::new(config),
            Err(GitHubClientError::Authentication(_))
        ));
    }
}
