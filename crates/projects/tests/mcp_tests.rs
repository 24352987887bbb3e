//! JSON-RPC tool adapter end to end over a scripted transport.

mod common;

use common::{project, roadmap_fields, ScriptedTransport};
use github_projects::mcp::McpServer;
use github_projects::GitHubClientError;
use serde_json::{json, Value};

async fn call(server: &McpServer, name: &str, arguments: Value) -> Value {
    let line = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
    .to_string();
    let response = server.handle_line(&line).await.expect("response");
    serde_json::to_value(response).unwrap()["result"].clone()
}

fn text(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap()
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let server = McpServer::new(ScriptedTransport::new().client());

    let init = server
        .handle_line(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#)
        .await
        .unwrap();
    assert_eq!(init.result.unwrap()["serverInfo"]["name"], "github-projects");

    let list = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap();
    let tools = list.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, 14);
}

#[tokio::test]
async fn test_protocol_errors() {
    let server = McpServer::new(ScriptedTransport::new().client());

    let parse = server.handle_line("{not json").await.unwrap();
    assert_eq!(parse.error.unwrap().code, -32700);

    let unknown = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
        .await
        .unwrap();
    assert_eq!(unknown.error.unwrap().code, -32601);

    let notification = server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .await;
    assert!(notification.is_none());
    assert!(server.handle_line("   ").await.is_none());
}

#[tokio::test]
async fn test_conflicting_filters_make_no_calls() {
    let transport = ScriptedTransport::new();
    let server = McpServer::new(transport.client());

    let result = call(
        &server,
        "get_project_items",
        json!({
            "owner": "acme",
            "project_number": 7,
            "state": "OPEN",
            "filter_field_name": "Status",
            "filter_field_value": "Todo"
        }),
    )
    .await;

    assert_eq!(result["isError"], true);
    assert!(text(&result).contains("Cannot filter by both"));
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_missing_argument_is_tool_error() {
    let server = McpServer::new(ScriptedTransport::new().client());

    let result = call(&server, "list_projects", json!({})).await;
    assert_eq!(result["isError"], true);
    assert_eq!(text(&result), "Error: Missing 'owner' parameter");

    let result = call(&server, "no_such_tool", json!({})).await;
    assert_eq!(text(&result), "Error: Unknown tool: no_such_tool");
}

#[tokio::test]
async fn test_get_project_fields_returns_schema_json() {
    let transport = ScriptedTransport::new();
    transport.on("ProjectFields", roadmap_fields());
    let server = McpServer::new(transport.client());

    let result = call(
        &server,
        "get_project_fields",
        json!({ "owner": "acme", "project_number": "7" }),
    )
    .await;

    assert!(result.get("isError").is_none());
    let schema: Value = serde_json::from_str(text(&result)).unwrap();
    let status = &schema["fields"][1];
    assert_eq!(status["name"], "Status");
    assert_eq!(status["type"], "SingleSelect");
    assert_eq!(status["options"][1]["name"], "In Progress");
}

#[tokio::test]
async fn test_set_dates_tool_uses_default_field_names() {
    let transport = ScriptedTransport::new();
    transport
        .on("GetProject", project("PVT_1", 7))
        .on("ProjectFields", roadmap_fields())
        .on(
            "UpdateItemField",
            json!({ "updateProjectV2ItemFieldValue": { "projectV2Item": { "id": "PVTI_1" } } }),
        );
    let server = McpServer::new(transport.client());

    let result = call(
        &server,
        "set_project_item_dates",
        json!({
            "owner": "acme",
            "project_number": 7,
            "item_id": "PVTI_1",
            "end_date": "2026-06-30"
        }),
    )
    .await;

    let body: Value = serde_json::from_str(text(&result)).unwrap();
    assert_eq!(body["updated"]["End Date"], "2026-06-30");
    assert_eq!(
        transport.calls_to("UpdateItemField")[0].variables["fieldId"],
        "PVTF_end"
    );
}

#[tokio::test]
async fn test_set_dates_tool_reports_written_dates_on_later_failure() {
    let transport = ScriptedTransport::new();
    transport
        .on("GetProject", project("PVT_1", 7))
        .on("ProjectFields", roadmap_fields())
        .on(
            "UpdateItemField",
            json!({ "updateProjectV2ItemFieldValue": { "projectV2Item": { "id": "PVTI_1" } } }),
        )
        .on_error(
            "UpdateItemField",
            GitHubClientError::Forbidden("nope".to_string()),
        );
    let server = McpServer::new(transport.client());

    let result = call(
        &server,
        "set_project_item_dates",
        json!({
            "owner": "acme",
            "project_number": 7,
            "item_id": "PVTI_1",
            "start_date": "2026-03-01",
            "end_date": "2026-06-30"
        }),
    )
    .await;

    assert!(result.get("isError").is_none());
    let body: Value = serde_json::from_str(text(&result)).unwrap();
    assert_eq!(body["updated"]["Start Date"], "2026-03-01");
    assert_eq!(body["failure"]["field"], "End Date");
    assert!(body["warning"].as_str().unwrap().contains("'End Date'"));
}

#[tokio::test]
async fn test_update_issue_labels_splits_ids() {
    let transport = ScriptedTransport::new();
    transport
        .on("GetIssueId", json!({ "repository": { "issue": { "id": "I_3" } } }))
        .on(
            "UpdateIssueLabels",
            json!({
                "updateIssue": {
                    "issue": {
                        "id": "I_3",
                        "number": 3,
                        "title": "Flaky",
                        "labels": { "nodes": [
                            { "id": "LA_1", "name": "bug", "color": "d73a4a" },
                            { "id": "LA_2", "name": "ci", "color": "0e8a16" }
                        ] }
                    }
                }
            }),
        );
    let server = McpServer::new(transport.client());

    let result = call(
        &server,
        "update_issue_labels",
        json!({ "owner": "acme", "repo": "web", "issue_number": 3, "label_ids": "LA_1, LA_2" }),
    )
    .await;

    let issue: Value = serde_json::from_str(text(&result)).unwrap();
    assert_eq!(issue["labels"][1]["name"], "ci");
    assert_eq!(
        transport.calls_to("UpdateIssueLabels")[0].variables["labelIds"],
        json!(["LA_1", "LA_2"])
    );
}
