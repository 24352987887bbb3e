//! GraphQL client for GitHub Projects V2.
//!
//! [`ProjectsClient`] is the facade every tool call goes through. Reads that
//! are not tied to items or fields live here; the field model, the item
//! engine and the mutations add their own `impl ProjectsClient` blocks.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{GitHubClientError, Result};
use crate::models::{IssueType, Label, PageInfo, Project};
use crate::transport::{GraphqlTransport, HttpTransport};

/// GitHub Projects V2 client.
///
/// Holds no state besides the transport, so clones can serve concurrent
/// operations independently.
#[derive(Clone)]
pub struct ProjectsClient {
    transport: Arc<dyn GraphqlTransport>,
}

impl std::fmt::Debug for ProjectsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectsClient").finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl ProjectsClient {
    /// Create a client talking HTTP to the configured endpoint.
    ///
    /// # Errors
    /// Returns error if no token is configured or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Create a client over any transport (used by tests).
    pub fn with_transport(transport: Arc<dyn GraphqlTransport>) -> Self {
        Self { transport }
    }

    /// Execute a document and decode the value at `pointer`.
    pub(crate) async fn query<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: Value,
        pointer: &str,
    ) -> Result<T> {
        let response = self.transport.execute(document, variables).await?;
        Ok(response.required(pointer)?)
    }

    /// Follow a connection until exhausted.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        document: &str,
        mut variables: Value,
        pointer: &str,
    ) -> Result<Vec<T>> {
        let mut collected = Vec::new();
        loop {
            let page: Connection<T> = self.query(document, variables.clone(), pointer).await?;
            collected.extend(page.nodes.into_iter().flatten());

            match page.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(cursor),
                } => variables["after"] = Value::String(cursor),
                _ => return Ok(collected),
            }
        }
    }

    // =========================================================================
    // Project Operations
    // =========================================================================

    /// List all Projects V2 of a user or organization.
    #[instrument(skip(self))]
    pub async fn list_projects(&self, owner: &str) -> Result<Vec<Project>> {
        const QUERY: &str = r"
            query ListProjects($owner: String!, $after: String) {
                repositoryOwner(login: $owner) {
                    ... on ProjectV2Owner {
                        projectsV2(first: 100, after: $after) {
                            pageInfo {
                                hasNextPage
                                endCursor
                            }
                            nodes {
                                id
                                number
                                title
                                url
                            }
                        }
                    }
                }
            }
        ";

        let mut projects: Vec<Project> = self
            .collect_pages(
                QUERY,
                json!({ "owner": owner, "after": null }),
                "/repositoryOwner/projectsV2",
            )
            .await?;
        for project in &mut projects {
            project.owner = owner.to_string();
        }

        debug!(count = projects.len(), "Listed projects");
        Ok(projects)
    }

    /// Look up a project by owner and number.
    #[instrument(skip(self))]
    pub async fn get_project(&self, owner: &str, project_number: u64) -> Result<Project> {
        const QUERY: &str = r"
            query GetProject($owner: String!, $number: Int!) {
                repositoryOwner(login: $owner) {
                    ... on ProjectV2Owner {
                        projectV2(number: $number) {
                            id
                            number
                            title
                            url
                        }
                    }
                }
            }
        ";

        let mut project: Project = self
            .query(
                QUERY,
                json!({ "owner": owner, "number": project_number }),
                "/repositoryOwner/projectV2",
            )
            .await
            .map_err(|e| not_found_as(e, || format!("Project #{project_number} of '{owner}'")))?;
        project.owner = owner.to_string();
        Ok(project)
    }

    // =========================================================================
    // Repository Operations
    // =========================================================================

    /// All labels of a repository; the lookup that turns label names into node ids.
    #[instrument(skip(self))]
    pub async fn get_repository_labels(&self, owner: &str, repo: &str) -> Result<Vec<Label>> {
        const QUERY: &str = r"
            query RepositoryLabels($owner: String!, $repo: String!, $after: String) {
                repository(owner: $owner, name: $repo) {
                    labels(first: 100, after: $after) {
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                        nodes {
                            id
                            name
                            color
                            description
                        }
                    }
                }
            }
        ";

        self.collect_pages(
            QUERY,
            json!({ "owner": owner, "repo": repo, "after": null }),
            "/repository/labels",
        )
        .await
    }

    /// Issue types available to a repository.
    #[instrument(skip(self))]
    pub async fn get_repository_issue_types(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<IssueType>> {
        const QUERY: &str = r"
            query RepositoryIssueTypes($owner: String!, $repo: String!, $after: String) {
                repository(owner: $owner, name: $repo) {
                    issueTypes(first: 100, after: $after) {
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                        nodes {
                            id
                            name
                            description
                        }
                    }
                }
            }
        ";

        self.collect_pages(
            QUERY,
            json!({ "owner": owner, "repo": repo, "after": null }),
            "/repository/issueTypes",
        )
        .await
    }

    /// Node id of an issue identified by repository and number.
    #[instrument(skip(self))]
    pub async fn get_issue_node_id(&self, owner: &str, repo: &str, number: u64) -> Result<String> {
        const QUERY: &str = r"
            query GetIssueId($owner: String!, $repo: String!, $issueNumber: Int!) {
                repository(owner: $owner, name: $repo) {
                    issue(number: $issueNumber) {
                        id
                    }
                }
            }
        ";

        self.query(
            QUERY,
            json!({ "owner": owner, "repo": repo, "issueNumber": number }),
            "/repository/issue/id",
        )
        .await
        .map_err(|e| not_found_as(e, || format!("Issue {owner}/{repo}#{number}")))
    }

    /// Node id of a repository.
    pub(crate) async fn get_repository_id(&self, owner: &str, repo: &str) -> Result<String> {
        const QUERY: &str = r"
            query GetRepositoryId($owner: String!, $repo: String!) {
                repository(owner: $owner, name: $repo) {
                    id
                }
            }
        ";

        self.query(
            QUERY,
            json!({ "owner": owner, "repo": repo }),
            "/repository/id",
        )
        .await
        .map_err(|e| not_found_as(e, || format!("Repository {owner}/{repo}")))
    }

    /// Node ids for user logins, in the given order.
    pub(crate) async fn get_user_ids(&self, logins: &[String]) -> Result<Vec<String>> {
        const QUERY: &str = r"
            query GetUserId($login: String!) {
                user(login: $login) {
                    id
                }
            }
        ";

        let mut ids = Vec::with_capacity(logins.len());
        for login in logins {
            let id: String = self
                .query(QUERY, json!({ "login": login }), "/user/id")
                .await
                .map_err(|e| not_found_as(e, || format!("User '{login}'")))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

/// Rewrite a bare "missing data" into a not-found error naming the object.
fn not_found_as(err: crate::error::Error, what: impl FnOnce() -> String) -> crate::error::Error {
    match err {
        crate::error::Error::Client(GitHubClientError::MissingData(_)) => {
            GitHubClientError::NotFound(format!("{} not found", what())).into()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let result = ProjectsClient::new(Config::with_token("test-token", "http://localhost"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_data_becomes_not_found() {
        let err = not_found_as(GitHubClientError::MissingData("/user/id".to_string()).into(), || {
            "User 'ghost'".to_string()
        });
        assert_eq!(err.to_string(), "Not found: User 'ghost' not found");
    }
}
