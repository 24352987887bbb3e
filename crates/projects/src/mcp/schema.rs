//! Tool descriptions returned by `tools/list`.

use serde_json::{json, Value};

fn owner_and_project() -> Value {
    json!({
        "owner": {
            "type": "string",
            "description": "GitHub organization or user that owns the project"
        },
        "project_number": {
            "type": "integer",
            "description": "Project number"
        }
    })
}

fn date_properties() -> Value {
    json!({
        "start_date": {
            "type": "string",
            "description": "Start date (YYYY-MM-DD)"
        },
        "end_date": {
            "type": "string",
            "description": "End date (YYYY-MM-DD)"
        },
        "start_field_name": {
            "type": "string",
            "description": "Name of the start date field (default: Start Date)"
        },
        "end_field_name": {
            "type": "string",
            "description": "Name of the end date field (default: End Date)"
        }
    })
}

fn issue_properties() -> Value {
    json!({
        "title": {
            "type": "string",
            "description": "Issue title"
        },
        "body": {
            "type": "string",
            "description": "Issue body (markdown)"
        },
        "assignees": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Logins to assign"
        }
    })
}

/// Merge several property maps into one object.
fn properties(parts: &[Value]) -> Value {
    let mut merged = serde_json::Map::new();
    for part in parts {
        if let Value::Object(map) = part {
            merged.extend(map.clone());
        }
    }
    Value::Object(merged)
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required
        }
    })
}

/// The `tools/list` payload.
pub fn tool_definitions() -> Value {
    let owner_only = json!({
        "owner": {
            "type": "string",
            "description": "GitHub organization or user"
        }
    });
    let repo = json!({
        "owner": {
            "type": "string",
            "description": "Repository owner"
        },
        "repo": {
            "type": "string",
            "description": "Repository name"
        }
    });
    let issue_ref = json!({
        "issue_owner": {
            "type": "string",
            "description": "Owner of the issue's repository"
        },
        "issue_repo": {
            "type": "string",
            "description": "Repository of the issue"
        },
        "issue_number": {
            "type": "integer",
            "description": "Issue number"
        }
    });
    let item = json!({
        "item_id": {
            "type": "string",
            "description": "Project item ID"
        }
    });

    json!({
        "tools": [
            tool(
                "list_projects",
                "List GitHub Projects V2 of a user or organization",
                owner_only,
                &["owner"],
            ),
            tool(
                "get_project_fields",
                "List the fields of a project with their types and options",
                owner_and_project(),
                &["owner", "project_number"],
            ),
            tool(
                "get_project_items",
                "List project items, optionally filtered by state or a custom field value",
                properties(&[
                    owner_and_project(),
                    json!({
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of items to return (default: 50)"
                        },
                        "state": {
                            "type": "string",
                            "description": "Issue/PR state filter (OPEN, CLOSED, MERGED)"
                        },
                        "filter_field_name": {
                            "type": "string",
                            "description": "Custom field to filter by (e.g. Status)"
                        },
                        "filter_field_value": {
                            "type": "string",
                            "description": "Value the field must have, compared case-insensitively"
                        },
                        "cursor": {
                            "type": "string",
                            "description": "Cursor from a previous page"
                        }
                    }),
                ]),
                &["owner", "project_number"],
            ),
            tool(
                "create_issue",
                "Create a new issue in a repository",
                properties(&[repo.clone(), issue_properties()]),
                &["owner", "repo", "title"],
            ),
            tool(
                "add_issue_to_project",
                "Add an existing issue to a project",
                properties(&[owner_and_project(), issue_ref.clone()]),
                &["owner", "project_number", "issue_owner", "issue_repo", "issue_number"],
            ),
            tool(
                "set_project_item_dates",
                "Set start and/or end date fields of a project item",
                properties(&[owner_and_project(), item.clone(), date_properties()]),
                &["owner", "project_number", "item_id"],
            ),
            tool(
                "add_issue_to_project_with_dates",
                "Add an existing issue to a project and set its dates",
                properties(&[owner_and_project(), issue_ref, date_properties()]),
                &["owner", "project_number", "issue_owner", "issue_repo", "issue_number"],
            ),
            tool(
                "create_issue_and_add_to_project",
                "Create an issue, add it to a project and set its dates",
                properties(&[
                    repo.clone(),
                    json!({
                        "project_number": {
                            "type": "integer",
                            "description": "Project number, owned by the repository owner"
                        }
                    }),
                    issue_properties(),
                    date_properties(),
                ]),
                &["owner", "repo", "project_number", "title"],
            ),
            tool(
                "update_project_item_field",
                "Set one field of a project item by field ID",
                properties(&[
                    owner_and_project(),
                    item.clone(),
                    json!({
                        "field_id": {
                            "type": "string",
                            "description": "Field ID"
                        },
                        "field_value": {
                            "type": "string",
                            "description": "Text, number, YYYY-MM-DD date, option ID, iteration ID or comma separated label IDs"
                        }
                    }),
                ]),
                &["owner", "project_number", "item_id", "field_id", "field_value"],
            ),
            tool(
                "create_draft_issue",
                "Create a draft issue directly in a project",
                properties(&[owner_and_project(), issue_properties()]),
                &["owner", "project_number", "title"],
            ),
            tool(
                "delete_project_item",
                "Remove an item from a project",
                properties(&[owner_and_project(), item]),
                &["owner", "project_number", "item_id"],
            ),
            tool(
                "get_repository_labels",
                "List the labels of a repository",
                repo.clone(),
                &["owner", "repo"],
            ),
            tool(
                "get_repository_issue_types",
                "List the issue types available to a repository",
                repo.clone(),
                &["owner", "repo"],
            ),
            tool(
                "update_issue_labels",
                "Replace the labels of an issue",
                properties(&[
                    repo,
                    json!({
                        "issue_number": {
                            "type": "integer",
                            "description": "Issue number"
                        },
                        "label_ids": {
                            "type": "string",
                            "description": "Comma separated label IDs; empty clears all labels"
                        }
                    }),
                ]),
                &["owner", "repo", "issue_number", "label_ids"],
            ),
        ]
    })
}
