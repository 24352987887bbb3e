//! Request dispatch for the stdio tool server.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{
    tool_definitions, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use crate::client::ProjectsClient;
use crate::fields::FieldWriteValue;
use crate::items::ItemQuery;
use crate::mutations::DateUpdate;

const DEFAULT_ITEM_LIMIT: usize = 50;

/// MCP server state
pub struct McpServer {
    client: ProjectsClient,
}

impl McpServer {
    pub fn new(client: ProjectsClient) -> Self {
        Self { client }
    }

    /// Handle one line of input; `None` for blank lines and notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        };

        // Notifications carry no id and get no answer.
        if request.id.is_none() && request.method.starts_with("notifications/") {
            debug!(method = %request.method, "Ignoring notification");
            return None;
        }

        Some(self.handle_request(&request).await)
    }

    pub async fn handle_request(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);

        match request.method.as_str() {
            "initialize" => Self::handle_initialize(id),
            "tools/list" => JsonRpcResponse::success(id, tool_definitions()),
            "tools/call" => self.handle_tool_call(id, request.params.as_ref()).await,
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, "Method not found"),
        }
    }

    fn handle_initialize(id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "github-projects",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tool_call(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params");
        };

        let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let result = match tool_name {
            "list_projects" => self.tool_list_projects(&arguments).await,
            "get_project_fields" => self.tool_get_project_fields(&arguments).await,
            "get_project_items" => self.tool_get_project_items(&arguments).await,
            "create_issue" => self.tool_create_issue(&arguments).await,
            "add_issue_to_project" => self.tool_add_issue_to_project(&arguments).await,
            "set_project_item_dates" => self.tool_set_project_item_dates(&arguments).await,
            "add_issue_to_project_with_dates" => {
                self.tool_add_issue_to_project_with_dates(&arguments).await
            }
            "create_issue_and_add_to_project" => {
                self.tool_create_issue_and_add_to_project(&arguments).await
            }
            "update_project_item_field" => self.tool_update_project_item_field(&arguments).await,
            "create_draft_issue" => self.tool_create_draft_issue(&arguments).await,
            "delete_project_item" => self.tool_delete_project_item(&arguments).await,
            "get_repository_labels" => self.tool_get_repository_labels(&arguments).await,
            "get_repository_issue_types" => {
                self.tool_get_repository_issue_types(&arguments).await
            }
            "update_issue_labels" => self.tool_update_issue_labels(&arguments).await,
            _ => Err(format!("Unknown tool: {tool_name}")),
        };

        match result {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{
                        "type": "text",
                        "text": content
                    }]
                }),
            ),
            Err(e) => {
                warn!(tool = tool_name, error = %e, "Tool call failed");
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{
                            "type": "text",
                            "text": format!("Error: {}", e)
                        }],
                        "isError": true
                    }),
                )
            }
        }
    }

    // Project reads

    async fn tool_list_projects(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let projects = self
            .client
            .list_projects(owner)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&projects)
    }

    async fn tool_get_project_fields(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let schema = self
            .client
            .describe_fields(owner, number)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&schema)
    }

    async fn tool_get_project_items(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let limit = optional_u64(args, "limit")?
            .map_or(DEFAULT_ITEM_LIMIT, |n| usize::try_from(n).unwrap_or(usize::MAX));

        let query = ItemQuery::new(
            limit,
            optional_str(args, "state"),
            optional_str(args, "filter_field_name"),
            optional_str(args, "filter_field_value"),
            optional_str(args, "cursor"),
        )
        .map_err(|e| e.to_string())?;

        let page = self
            .client
            .get_project_items(owner, number, &query)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&page)
    }

    // Issues

    async fn tool_create_issue(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let repo = required_str(args, "repo")?;
        let title = required_str(args, "title")?;
        let body = optional_str(args, "body").unwrap_or("");
        let assignees = string_list(args, "assignees");

        let issue = self
            .client
            .create_issue(owner, repo, title, body, &assignees)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&issue)
    }

    async fn tool_get_repository_labels(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let repo = required_str(args, "repo")?;
        let labels = self
            .client
            .get_repository_labels(owner, repo)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&labels)
    }

    async fn tool_get_repository_issue_types(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let repo = required_str(args, "repo")?;
        let types = self
            .client
            .get_repository_issue_types(owner, repo)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&types)
    }

    async fn tool_update_issue_labels(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let repo = required_str(args, "repo")?;
        let number = required_u64(args, "issue_number")?;
        let label_ids = string_list(args, "label_ids");

        let issue = self
            .client
            .update_issue_labels(owner, repo, number, &label_ids)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&issue)
    }

    // Project items

    async fn tool_add_issue_to_project(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let issue_owner = required_str(args, "issue_owner")?;
        let issue_repo = required_str(args, "issue_repo")?;
        let issue_number = required_u64(args, "issue_number")?;

        let added = self
            .client
            .add_issue_to_project(owner, number, issue_owner, issue_repo, issue_number)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&added)
    }

    async fn tool_set_project_item_dates(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let item_id = required_str(args, "item_id")?;
        let dates = date_update(args);

        let writes = self
            .client
            .set_project_item_dates(owner, number, item_id, &dates)
            .await
            .map_err(|e| e.to_string())?;

        let warning = match &writes.failure {
            Some(failure) => Some(format!(
                "Failed to set '{}' after other dates were written: {}",
                failure.field, failure.error
            )),
            None if writes.updated.is_empty() => {
                Some("No date fields were updated (fields may not exist)".to_string())
            }
            None => None,
        };
        let mut result = json!({ "itemId": item_id, "updated": writes.updated });
        if let Some(failure) = writes.failure {
            result["failure"] = json!(failure);
        }
        if let Some(warning) = warning {
            result["warning"] = json!(warning);
        }
        to_pretty(&result)
    }

    async fn tool_add_issue_to_project_with_dates(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let issue_owner = required_str(args, "issue_owner")?;
        let issue_repo = required_str(args, "issue_repo")?;
        let issue_number = required_u64(args, "issue_number")?;
        let dates = date_update(args);

        let outcome = self
            .client
            .add_issue_to_project_with_dates(
                owner,
                number,
                issue_owner,
                issue_repo,
                issue_number,
                &dates,
            )
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&outcome)
    }

    async fn tool_create_issue_and_add_to_project(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let repo = required_str(args, "repo")?;
        let number = required_u64(args, "project_number")?;
        let title = required_str(args, "title")?;
        let body = optional_str(args, "body").unwrap_or("");
        let assignees = string_list(args, "assignees");
        let dates = date_update(args);

        let outcome = self
            .client
            .create_issue_and_add_to_project(
                owner, repo, number, title, body, &assignees, &dates,
            )
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&outcome)
    }

    async fn tool_update_project_item_field(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let item_id = required_str(args, "item_id")?;
        let field_id = required_str(args, "field_id")?;
        let raw = args
            .get("field_value")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or("Missing 'field_value' parameter")?;

        let value = FieldWriteValue::infer(field_id, &raw);
        let update = self
            .client
            .update_project_item_field(owner, number, item_id, field_id, &value)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&update)
    }

    async fn tool_create_draft_issue(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let title = required_str(args, "title")?;
        let body = optional_str(args, "body").unwrap_or("");
        let assignees = string_list(args, "assignees");

        let draft = self
            .client
            .create_draft_issue(owner, number, title, body, &assignees)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&draft)
    }

    async fn tool_delete_project_item(&self, args: &Value) -> Result<String, String> {
        let owner = required_str(args, "owner")?;
        let number = required_u64(args, "project_number")?;
        let item_id = required_str(args, "item_id")?;

        let deleted = self
            .client
            .delete_project_item(owner, number, item_id)
            .await
            .map_err(|e| e.to_string())?;
        to_pretty(&json!({ "deletedItemId": deleted }))
    }
}

// Argument helpers

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    optional_str(args, key).ok_or_else(|| format!("Missing '{key}' parameter"))
}

fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Integers may arrive as JSON numbers or numeric strings.
fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("'{key}' must be a non-negative integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("'{key}' must be a non-negative integer")),
        Some(_) => Err(format!("'{key}' must be a non-negative integer")),
    }
}

fn required_u64(args: &Value, key: &str) -> Result<u64, String> {
    optional_u64(args, key)?.ok_or_else(|| format!("Missing '{key}' parameter"))
}

/// A JSON array of strings or a comma separated string.
fn string_list(args: &Value, key: &str) -> Vec<String> {
    match args.get(key) {
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn date_update(args: &Value) -> DateUpdate {
    DateUpdate::new(optional_str(args, "start_date"), optional_str(args, "end_date"))
        .with_field_names(
            optional_str(args, "start_field_name"),
            optional_str(args, "end_field_name"),
        )
}

fn to_pretty<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}
