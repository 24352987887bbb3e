//! HTTP transport behavior against a mock GraphQL endpoint.

use github_projects::transport::GraphqlResponse;
use github_projects::{Config, GitHubClientError, GraphqlTransport, HttpTransport, ProjectsClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    Config {
        token: Some("test-token".to_string()),
        api_url: format!("{}/graphql", server.uri()),
        max_retries: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
    }
}

async fn execute(server: &MockServer) -> Result<GraphqlResponse, GitHubClientError> {
    let transport = HttpTransport::new(config(server)).unwrap();
    transport
        .execute("query Viewer { viewer { login } }", json!({}))
        .await
}

fn viewer() -> Value {
    json!({ "data": { "viewer": { "login": "octocat" } } })
}

#[tokio::test]
async fn test_sends_bearer_token_and_variables() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({ "variables": { "owner": "acme" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "repositoryOwner": {
                    "projectsV2": {
                        "pageInfo": { "hasNextPage": false, "endCursor": null },
                        "nodes": [
                            { "id": "PVT_1", "number": 7, "title": "Roadmap", "url": "https://github.com/orgs/acme/projects/7" }
                        ]
                    }
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProjectsClient::with_transport(Arc::new(HttpTransport::new(config(&server)).unwrap()));
    let projects = client.list_projects("acme").await.unwrap();

    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].number, 7);
    assert_eq!(projects[0].owner, "acme");
}

#[tokio::test]
async fn test_missing_token_is_authentication_error() {
    let config = Config {
        token: None,
        ..Config::with_token("unused", "http://localhost")
    };
    let err = HttpTransport::new(config).unwrap_err();
    assert!(matches!(err, GitHubClientError::Authentication(_)));
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "message": "Bad credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = execute(&server).await.unwrap_err();
    assert!(matches!(err, GitHubClientError::Authentication(ref m) if m == "Bad credentials"));
}

#[tokio::test]
async fn test_schema_error_passes_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{
                "message": "Field 'viewr' doesn't exist on type 'Query'",
                "locations": [{ "line": 1, "column": 16 }],
                "extensions": { "code": "undefinedField", "typeName": "Query", "fieldName": "viewr" }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = execute(&server).await.unwrap();
    let err = response.required::<Value>("/viewer").unwrap_err();
    assert!(matches!(err, GitHubClientError::Schema(ref m) if m.contains("viewr")));
}

#[tokio::test]
async fn test_retries_bad_gateway_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viewer()))
        .expect(1)
        .mount(&server)
        .await;

    let login: String = execute(&server).await.unwrap().required("/viewer/login").unwrap();
    assert_eq!(login, "octocat");
}

#[tokio::test]
async fn test_retries_secondary_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("retry-after", "1")
                .set_body_json(json!({ "message": "You have exceeded a secondary rate limit" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viewer()))
        .expect(1)
        .mount(&server)
        .await;

    assert!(execute(&server).await.is_ok());
}

#[tokio::test]
async fn test_retries_graphql_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{ "type": "RATE_LIMITED", "message": "API rate limit exceeded" }]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(viewer()))
        .expect(1)
        .mount(&server)
        .await;

    assert!(execute(&server).await.is_ok());
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = execute(&server).await.unwrap_err();
    match err {
        GitHubClientError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, GitHubClientError::Network(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_forbidden_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "Resource not accessible by integration" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = execute(&server).await.unwrap_err();
    assert!(matches!(err, GitHubClientError::Forbidden(_)));
}

#[tokio::test]
async fn test_partial_success_keeps_present_data() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "viewer": { "login": "octocat" },
                "organization": null
            },
            "errors": [{
                "type": "NOT_FOUND",
                "path": ["organization"],
                "message": "Could not resolve to an Organization with the login of 'nope'."
            }]
        })))
        .mount(&server)
        .await;

    let response = execute(&server).await.unwrap();
    let login: String = response.clone().required("/viewer/login").unwrap();
    assert_eq!(login, "octocat");

    let err = response.required::<Value>("/organization").unwrap_err();
    assert!(matches!(err, GitHubClientError::NotFound(_)));
}
