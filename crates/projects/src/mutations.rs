//! Project and issue mutations.
//!
//! Atomic operations run one GraphQL mutation each, after whatever lookups
//! they need to turn human-facing references into node ids. Composed
//! operations run their steps strictly in order and never roll back: a step
//! that fails after earlier steps committed is reported in the returned
//! [`CompositeOutcome`] instead of failing the whole call.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::client::ProjectsClient;
use crate::error::{Error, GitHubClientError, Result};
use crate::fields::{parse_date, FieldKind, FieldWriteValue, Nodes};
use crate::models::{CreatedIssue, Label, LabeledIssue};

pub const DEFAULT_START_FIELD: &str = "Start Date";
pub const DEFAULT_END_FIELD: &str = "End Date";

/// Start/end dates to write and the names of the fields that hold them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateUpdate {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start_field_name: String,
    pub end_field_name: String,
}

impl Default for DateUpdate {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            start_field_name: DEFAULT_START_FIELD.to_string(),
            end_field_name: DEFAULT_END_FIELD.to_string(),
        }
    }
}

impl DateUpdate {
    /// Dates with the default field names; blank strings count as absent.
    pub fn new(start_date: Option<&str>, end_date: Option<&str>) -> Self {
        let present = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };
        Self {
            start_date: present(start_date),
            end_date: present(end_date),
            ..Self::default()
        }
    }

    /// Override the field names; blank names keep the defaults.
    pub fn with_field_names(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        if let Some(start) = start.map(str::trim).filter(|s| !s.is_empty()) {
            self.start_field_name = start.to_string();
        }
        if let Some(end) = end.map(str::trim).filter(|s| !s.is_empty()) {
            self.end_field_name = end.to_string();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none()
    }

    /// At least one date, each a real `YYYY-MM-DD` day.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation(
                "Provide at least one of start_date or end_date",
            ));
        }
        for date in [&self.start_date, &self.end_date].into_iter().flatten() {
            parse_date(date).map_err(Error::Validation)?;
        }
        Ok(())
    }

    fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        [
            (self.start_field_name.as_str(), self.start_date.as_deref()),
            (self.end_field_name.as_str(), self.end_date.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, date)| date.map(|d| (field, d)))
    }
}

/// Item created by adding content to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedItem {
    pub item_id: String,
    pub project_id: String,
    /// Node id of the Issue, Pull Request or draft
    pub content_id: String,
}

/// Result of a single field write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub item_id: String,
    pub field_id: String,
    pub value: FieldWriteValue,
}

/// A date write that failed after earlier writes were committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWriteFailure {
    pub field: String,
    pub error: String,
}

/// Dates written to an item, field name to date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWrites {
    pub updated: BTreeMap<String, String>,
    /// Set when a write failed after another one had already landed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DateWriteFailure>,
}

/// Steps of the composed operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateIssue,
    AddToProject,
    SetDates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// What a composed operation did, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeOutcome {
    /// Issue created by the first step, kept even when linking failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<CreatedIssue>,
    pub item_id: Option<String>,
    /// Field name to date for every date field written.
    pub dates: BTreeMap<String, String>,
    pub steps: Vec<StepReport>,
    /// Set when a step after a committed one failed or did nothing.
    pub warning: Option<String>,
}

impl CompositeOutcome {
    fn record(&mut self, step: Step, status: StepStatus) {
        self.steps.push(StepReport { step, status });
    }

    pub fn status_of(&self, step: Step) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }

    /// Run the date step against an already added item.
    async fn apply_dates(
        &mut self,
        client: &ProjectsClient,
        owner: &str,
        project_number: u64,
        item_id: &str,
        dates: &DateUpdate,
    ) {
        if dates.is_empty() {
            self.record(Step::SetDates, StepStatus::Skipped);
            return;
        }

        match client
            .set_project_item_dates(owner, project_number, item_id, dates)
            .await
        {
            Ok(DateWrites {
                updated,
                failure: Some(failure),
            }) => {
                warn!(item_id, field = %failure.field, error = %failure.error, "Date write failed after others landed");
                self.warning = Some(format!(
                    "Item added but failed to set '{}': {}",
                    failure.field, failure.error
                ));
                self.dates = updated;
                self.record(
                    Step::SetDates,
                    StepStatus::Failed {
                        error: failure.error,
                    },
                );
            }
            Ok(DateWrites {
                updated,
                failure: None,
            }) => {
                if updated.is_empty() {
                    self.warning =
                        Some("No date fields were updated (fields may not exist)".to_string());
                }
                self.dates = updated;
                self.record(Step::SetDates, StepStatus::Completed);
            }
            Err(e) => {
                warn!(item_id, error = %e, "Item added but setting dates failed");
                self.warning = Some(format!("Item added but failed to set dates: {e}"));
                self.record(
                    Step::SetDates,
                    StepStatus::Failed {
                        error: e.to_string(),
                    },
                );
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct Login {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawCreatedIssue {
    id: String,
    number: u64,
    title: String,
    url: String,
    #[serde(default)]
    assignees: Option<Nodes<Login>>,
}

#[derive(Debug, Deserialize)]
struct RawLabeledIssue {
    id: String,
    number: u64,
    title: String,
    labels: Option<Nodes<Label>>,
}

impl ProjectsClient {
    // =========================================================================
    // Issue Operations
    // =========================================================================

    /// Create an issue, assigning the given logins.
    #[instrument(skip(self, body))]
    pub async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        title: &str,
        body: &str,
        assignees: &[String],
    ) -> Result<CreatedIssue> {
        const MUTATION: &str = r"
            mutation CreateIssue($input: CreateIssueInput!) {
                createIssue(input: $input) {
                    issue {
                        id
                        number
                        title
                        url
                        assignees(first: 20) {
                            nodes {
                                login
                            }
                        }
                    }
                }
            }
        ";

        if title.trim().is_empty() {
            return Err(Error::validation("Issue title must not be empty"));
        }

        let repository_id = self.get_repository_id(owner, repo).await?;
        let assignee_ids = self.get_user_ids(assignees).await?;

        let issue: RawCreatedIssue = self
            .query(
                MUTATION,
                json!({
                    "input": {
                        "repositoryId": repository_id,
                        "title": title,
                        "body": body,
                        "assigneeIds": assignee_ids,
                    }
                }),
                "/createIssue/issue",
            )
            .await?;

        info!(number = issue.number, url = %issue.url, "Created issue");
        Ok(CreatedIssue {
            id: issue.id,
            number: issue.number,
            title: issue.title,
            url: issue.url,
            assignees: issue
                .assignees
                .map(|a| a.nodes.into_iter().map(|l| l.login).collect())
                .unwrap_or_default(),
        })
    }

    /// Replace the full label set of an issue.
    ///
    /// An empty `label_ids` clears every label.
    #[instrument(skip(self))]
    pub async fn update_issue_labels(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        label_ids: &[String],
    ) -> Result<LabeledIssue> {
        const MUTATION: &str = r"
            mutation UpdateIssueLabels($issueId: ID!, $labelIds: [ID!]!) {
                updateIssue(input: { id: $issueId, labelIds: $labelIds }) {
                    issue {
                        id
                        number
                        title
                        labels(first: 20) {
                            nodes {
                                id
                                name
                                color
                            }
                        }
                    }
                }
            }
        ";

        let issue_id = self.get_issue_node_id(owner, repo, issue_number).await?;
        let issue: RawLabeledIssue = self
            .query(
                MUTATION,
                json!({ "issueId": issue_id, "labelIds": label_ids }),
                "/updateIssue/issue",
            )
            .await?;

        info!(labels = label_ids.len(), "Replaced issue labels");
        Ok(LabeledIssue {
            id: issue.id,
            number: issue.number,
            title: issue.title,
            labels: issue.labels.map(|l| l.nodes).unwrap_or_default(),
        })
    }

    // =========================================================================
    // Project Item Operations
    // =========================================================================

    /// Add an existing issue to a project.
    #[instrument(skip(self))]
    pub async fn add_issue_to_project(
        &self,
        owner: &str,
        project_number: u64,
        issue_owner: &str,
        issue_repo: &str,
        issue_number: u64,
    ) -> Result<AddedItem> {
        let project = self.get_project(owner, project_number).await?;
        let content_id = self
            .get_issue_node_id(issue_owner, issue_repo, issue_number)
            .await?;
        self.add_content_to_project(project.id, content_id).await
    }

    /// Create a draft issue directly in a project.
    #[instrument(skip(self, body))]
    pub async fn create_draft_issue(
        &self,
        owner: &str,
        project_number: u64,
        title: &str,
        body: &str,
        assignees: &[String],
    ) -> Result<AddedItem> {
        const MUTATION: &str = r"
            mutation AddDraftIssue($input: AddProjectV2DraftIssueInput!) {
                addProjectV2DraftIssue(input: $input) {
                    projectItem {
                        id
                        content {
                            ... on DraftIssue {
                                id
                            }
                        }
                    }
                }
            }
        ";

        #[derive(Deserialize)]
        struct DraftItem {
            id: String,
            content: Option<DraftContent>,
        }

        #[derive(Deserialize)]
        struct DraftContent {
            id: String,
        }

        if title.trim().is_empty() {
            return Err(Error::validation("Draft issue title must not be empty"));
        }

        let project = self.get_project(owner, project_number).await?;
        let assignee_ids = self.get_user_ids(assignees).await?;

        let item: DraftItem = self
            .query(
                MUTATION,
                json!({
                    "input": {
                        "projectId": project.id,
                        "title": title,
                        "body": body,
                        "assigneeIds": assignee_ids,
                    }
                }),
                "/addProjectV2DraftIssue/projectItem",
            )
            .await?;

        info!(item_id = %item.id, "Created draft issue");
        Ok(AddedItem {
            item_id: item.id,
            project_id: project.id,
            content_id: item.content.map(|c| c.id).unwrap_or_default(),
        })
    }

    /// Write one field of an item by field id.
    ///
    /// No schema lookup happens here; resolve names through
    /// [`crate::fields::Field::resolve_write_value`] first. Label writes go to
    /// the linked Issue or Pull Request and replace its labels.
    #[instrument(skip(self))]
    pub async fn update_project_item_field(
        &self,
        owner: &str,
        project_number: u64,
        item_id: &str,
        field_id: &str,
        value: &FieldWriteValue,
    ) -> Result<FieldUpdate> {
        if let FieldWriteValue::LabelIds(label_ids) = value {
            self.replace_item_labels(item_id, label_ids).await?;
        } else {
            let project = self.get_project(owner, project_number).await?;
            self.write_field_value(&project.id, item_id, field_id, value)
                .await?;
        }

        info!(item_id, field_id, "Updated project item field");
        Ok(FieldUpdate {
            item_id: item_id.to_string(),
            field_id: field_id.to_string(),
            value: value.clone(),
        })
    }

    /// Remove an item from a project. Unknown item ids are reported by the API.
    #[instrument(skip(self))]
    pub async fn delete_project_item(
        &self,
        owner: &str,
        project_number: u64,
        item_id: &str,
    ) -> Result<String> {
        const MUTATION: &str = r"
            mutation DeleteItem($projectId: ID!, $itemId: ID!) {
                deleteProjectV2Item(input: { projectId: $projectId, itemId: $itemId }) {
                    deletedItemId
                }
            }
        ";

        let project = self.get_project(owner, project_number).await?;
        let deleted: String = self
            .query(
                MUTATION,
                json!({ "projectId": project.id, "itemId": item_id }),
                "/deleteProjectV2Item/deletedItemId",
            )
            .await?;

        info!(deleted_item_id = %deleted, "Deleted project item");
        Ok(deleted)
    }

    /// Set start and/or end date fields of an item, looked up by name.
    ///
    /// Fields missing from the project, or not of type Date, are skipped and
    /// left out of the returned map. A write failing before any other landed
    /// fails the call; one failing afterwards is returned in
    /// [`DateWrites::failure`] next to the dates already written.
    #[instrument(skip(self))]
    pub async fn set_project_item_dates(
        &self,
        owner: &str,
        project_number: u64,
        item_id: &str,
        dates: &DateUpdate,
    ) -> Result<DateWrites> {
        dates.validate()?;

        let project = self.get_project(owner, project_number).await?;
        let schema = self.describe_fields(owner, project_number).await?;

        let mut writes = DateWrites::default();
        for (field_name, date) in dates.pairs() {
            let Some(field) = schema.get(field_name) else {
                warn!(field_name, "Date field not found on project, skipping");
                continue;
            };
            if !matches!(field.kind, FieldKind::Date) {
                warn!(
                    field_name,
                    field_type = field.kind.type_name(),
                    "Field is not a date field, skipping"
                );
                continue;
            }
            let value = field.resolve_write_value(date)?;
            if let Err(e) = self
                .write_field_value(&project.id, item_id, &field.id, &value)
                .await
            {
                if writes.updated.is_empty() {
                    return Err(e);
                }
                writes.failure = Some(DateWriteFailure {
                    field: field.name.clone(),
                    error: e.to_string(),
                });
                break;
            }
            writes.updated.insert(field.name.clone(), date.to_string());
        }

        info!(updated = writes.updated.len(), "Set project item dates");
        Ok(writes)
    }

    // =========================================================================
    // Composed Operations
    // =========================================================================

    /// Add an issue to a project, then set its dates.
    ///
    /// Failing to add fails the call. Failing to set dates afterwards leaves
    /// the item in place and is reported as a warning.
    #[instrument(skip(self))]
    pub async fn add_issue_to_project_with_dates(
        &self,
        owner: &str,
        project_number: u64,
        issue_owner: &str,
        issue_repo: &str,
        issue_number: u64,
        dates: &DateUpdate,
    ) -> Result<CompositeOutcome> {
        if !dates.is_empty() {
            dates.validate()?;
        }

        let added = self
            .add_issue_to_project(owner, project_number, issue_owner, issue_repo, issue_number)
            .await?;

        let mut outcome = CompositeOutcome {
            item_id: Some(added.item_id.clone()),
            ..CompositeOutcome::default()
        };
        outcome.record(Step::AddToProject, StepStatus::Completed);
        outcome
            .apply_dates(self, owner, project_number, &added.item_id, dates)
            .await;
        Ok(outcome)
    }

    /// Create an issue, add it to a project, then set its dates.
    ///
    /// Only a failed issue creation fails the call. If linking fails the
    /// created issue is still returned, with the failure recorded.
    #[instrument(skip(self, body))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_issue_and_add_to_project(
        &self,
        owner: &str,
        repo: &str,
        project_number: u64,
        title: &str,
        body: &str,
        assignees: &[String],
        dates: &DateUpdate,
    ) -> Result<CompositeOutcome> {
        if !dates.is_empty() {
            dates.validate()?;
        }

        let issue = self.create_issue(owner, repo, title, body, assignees).await?;
        let issue_number = issue.number;
        let content_id = issue.id.clone();

        let mut outcome = CompositeOutcome {
            issue: Some(issue),
            ..CompositeOutcome::default()
        };
        outcome.record(Step::CreateIssue, StepStatus::Completed);

        let linked = match self.get_project(owner, project_number).await {
            Ok(project) => self.add_content_to_project(project.id, content_id).await,
            Err(e) => Err(e),
        };
        let added = match linked {
            Ok(added) => added,
            Err(e) => {
                warn!(issue_number, error = %e, "Issue created but adding to project failed");
                outcome.warning = Some(format!(
                    "Issue #{issue_number} was created but could not be added to project #{project_number}: {e}"
                ));
                outcome.record(
                    Step::AddToProject,
                    StepStatus::Failed {
                        error: e.to_string(),
                    },
                );
                outcome.record(Step::SetDates, StepStatus::Skipped);
                return Ok(outcome);
            }
        };

        outcome.item_id = Some(added.item_id.clone());
        outcome.record(Step::AddToProject, StepStatus::Completed);
        outcome
            .apply_dates(self, owner, project_number, &added.item_id, dates)
            .await;
        Ok(outcome)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn add_content_to_project(
        &self,
        project_id: String,
        content_id: String,
    ) -> Result<AddedItem> {
        const MUTATION: &str = r"
            mutation AddItem($projectId: ID!, $contentId: ID!) {
                addProjectV2ItemById(input: { projectId: $projectId, contentId: $contentId }) {
                    item {
                        id
                    }
                }
            }
        ";

        let item_id: String = self
            .query(
                MUTATION,
                json!({ "projectId": project_id, "contentId": content_id }),
                "/addProjectV2ItemById/item/id",
            )
            .await?;

        info!(item_id = %item_id, "Added issue to project");
        Ok(AddedItem {
            item_id,
            project_id,
            content_id,
        })
    }

    async fn write_field_value(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        value: &FieldWriteValue,
    ) -> Result<()> {
        const MUTATION: &str = r"
            mutation UpdateItemField($projectId: ID!, $itemId: ID!, $fieldId: ID!, $value: ProjectV2FieldValue!) {
                updateProjectV2ItemFieldValue(
                    input: { projectId: $projectId, itemId: $itemId, fieldId: $fieldId, value: $value }
                ) {
                    projectV2Item {
                        id
                    }
                }
            }
        ";

        let input = value.to_input().ok_or_else(|| {
            Error::validation("Label values are applied to the linked issue, not the project field")
        })?;

        let _: Value = self
            .query(
                MUTATION,
                json!({
                    "projectId": project_id,
                    "itemId": item_id,
                    "fieldId": field_id,
                    "value": input,
                }),
                "/updateProjectV2ItemFieldValue/projectV2Item",
            )
            .await?;
        Ok(())
    }

    /// Replace labels on the Issue or Pull Request behind a project item.
    async fn replace_item_labels(&self, item_id: &str, label_ids: &[String]) -> Result<()> {
        const CONTENT_QUERY: &str = r"
            query ItemContent($itemId: ID!) {
                node(id: $itemId) {
                    ... on ProjectV2Item {
                        content {
                            __typename
                            ... on Issue {
                                id
                            }
                            ... on PullRequest {
                                id
                            }
                        }
                    }
                }
            }
        ";

        const ISSUE_MUTATION: &str = r"
            mutation SetIssueLabels($id: ID!, $labelIds: [ID!]!) {
                updateIssue(input: { id: $id, labelIds: $labelIds }) {
                    issue {
                        id
                    }
                }
            }
        ";

        const PULL_REQUEST_MUTATION: &str = r"
            mutation SetPullRequestLabels($id: ID!, $labelIds: [ID!]!) {
                updatePullRequest(input: { pullRequestId: $id, labelIds: $labelIds }) {
                    pullRequest {
                        id
                    }
                }
            }
        ";

        #[derive(Deserialize)]
        struct Content {
            #[serde(rename = "__typename")]
            typename: String,
            id: Option<String>,
        }

        let content: Content = self
            .query(
                CONTENT_QUERY,
                json!({ "itemId": item_id }),
                "/node/content",
            )
            .await?;

        let (mutation, pointer, content_id) = match (content.typename.as_str(), content.id) {
            ("Issue", Some(id)) => (ISSUE_MUTATION, "/updateIssue/issue", id),
            ("PullRequest", Some(id)) => {
                (PULL_REQUEST_MUTATION, "/updatePullRequest/pullRequest", id)
            }
            (other, _) => {
                return Err(GitHubClientError::Api(format!(
                    "Item {item_id} wraps a {other}, which has no labels"
                ))
                .into())
            }
        };

        let _: Value = self
            .query(
                mutation,
                json!({ "id": content_id, "labelIds": label_ids }),
                pointer,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_update_requires_a_date() {
        let err = DateUpdate::new(None, Some("  ")).validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_date_update_rejects_bad_dates() {
        assert!(DateUpdate::new(Some("2026-13-01"), None).validate().is_err());
        assert!(DateUpdate::new(Some("01/02/2026"), None).validate().is_err());
        assert!(DateUpdate::new(Some("2026-02-28"), Some("2026-03-14"))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_date_update_pairs_and_names() {
        let dates = DateUpdate::new(Some("2026-01-05"), None)
            .with_field_names(Some("Kickoff"), Some(""));
        assert_eq!(dates.end_field_name, DEFAULT_END_FIELD);
        assert_eq!(dates.pairs().collect::<Vec<_>>(), vec![("Kickoff", "2026-01-05")]);
    }

    #[test]
    fn test_step_report_serialization() {
        let report = StepReport {
            step: Step::AddToProject,
            status: StepStatus::Failed {
                error: "boom".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"step": "add_to_project", "status": "failed", "error": "boom"})
        );
    }
}
