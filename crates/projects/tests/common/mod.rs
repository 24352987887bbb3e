//! Shared fixtures: an in-memory transport that answers by operation name.

#![allow(dead_code)]

use async_trait::async_trait;
use github_projects::transport::GraphqlResponse;
use github_projects::{GitHubClientError, GraphqlTransport, ProjectsClient};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One recorded `execute` call.
#[derive(Debug, Clone)]
pub struct Call {
    pub operation: String,
    pub variables: Value,
}

/// Replies queued per operation name, consumed in order.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<GraphqlResponse, GitHubClientError>>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(self: &Arc<Self>) -> ProjectsClient {
        ProjectsClient::with_transport(self.clone())
    }

    /// Queue a successful `data` payload for `operation`.
    pub fn on(&self, operation: &str, data: Value) -> &Self {
        self.push(operation, Ok(GraphqlResponse::from_data(data)))
    }

    /// Queue a raw response envelope, `errors` included.
    pub fn on_response(&self, operation: &str, envelope: Value) -> &Self {
        let response = serde_json::from_value(envelope).expect("valid envelope");
        self.push(operation, Ok(response))
    }

    /// Queue a transport failure.
    pub fn on_error(&self, operation: &str, error: GitHubClientError) -> &Self {
        self.push(operation, Err(error))
    }

    fn push(&self, operation: &str, reply: Result<GraphqlResponse, GitHubClientError>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation == operation)
            .collect()
    }

    pub fn operations(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }
}

/// `query Name(` / `mutation Name(` -> `Name`.
fn operation_name(document: &str) -> String {
    document
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .split(['(', '{'])
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl GraphqlTransport for ScriptedTransport {
    async fn execute(
        &self,
        document: &str,
        variables: Value,
    ) -> Result<GraphqlResponse, GitHubClientError> {
        let operation = operation_name(document);
        self.calls.lock().unwrap().push(Call {
            operation: operation.clone(),
            variables,
        });

        self.replies
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(GitHubClientError::Api(format!(
                    "no scripted reply for {operation}"
                )))
            })
    }
}

// Payload builders

pub fn project(id: &str, number: u64) -> Value {
    json!({
        "repositoryOwner": {
            "projectV2": {
                "id": id,
                "number": number,
                "title": "Roadmap",
                "url": format!("https://github.com/orgs/acme/projects/{number}")
            }
        }
    })
}

pub fn single_select(name: &str, value: &str) -> Value {
    json!({
        "__typename": "ProjectV2ItemFieldSingleSelectValue",
        "name": value,
        "optionId": format!("opt_{}", value.to_lowercase()),
        "field": { "name": name }
    })
}

pub fn date_value(name: &str, date: &str) -> Value {
    json!({
        "__typename": "ProjectV2ItemFieldDateValue",
        "date": date,
        "field": { "name": name }
    })
}

/// Item edge wrapping an open Issue with the given field values.
pub fn issue_edge(item_id: &str, cursor: &str, number: u64, field_values: Vec<Value>) -> Value {
    json!({
        "cursor": cursor,
        "node": {
            "id": item_id,
            "content": {
                "__typename": "Issue",
                "id": format!("I_{number}"),
                "number": number,
                "title": format!("Issue {number}"),
                "state": "OPEN",
                "url": format!("https://github.com/acme/web/issues/{number}"),
                "repository": { "name": "web", "owner": { "login": "acme" } },
                "issueType": null
            },
            "fieldValues": { "nodes": field_values }
        }
    })
}

pub fn items_page(edges: Vec<Value>, has_next_page: bool, end_cursor: Option<&str>) -> Value {
    json!({
        "repositoryOwner": {
            "projectV2": {
                "items": {
                    "pageInfo": { "hasNextPage": has_next_page, "endCursor": end_cursor },
                    "edges": edges
                }
            }
        }
    })
}

/// A Status single-select plus Start/End date fields.
pub fn roadmap_fields() -> Value {
    json!({
        "repositoryOwner": {
            "projectV2": {
                "fields": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": [
                        { "__typename": "ProjectV2Field", "id": "PVTF_title", "name": "Title", "dataType": "TITLE" },
                        {
                            "__typename": "ProjectV2SingleSelectField",
                            "id": "PVTSSF_status",
                            "name": "Status",
                            "dataType": "SINGLE_SELECT",
                            "options": [
                                { "id": "opt_todo", "name": "Todo" },
                                { "id": "opt_progress", "name": "In Progress" },
                                { "id": "opt_done", "name": "Done" }
                            ]
                        },
                        { "__typename": "ProjectV2Field", "id": "PVTF_start", "name": "Start Date", "dataType": "DATE" },
                        { "__typename": "ProjectV2Field", "id": "PVTF_end", "name": "End Date", "dataType": "DATE" }
                    ]
                }
            }
        }
    })
}
