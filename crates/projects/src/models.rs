//! GitHub Projects V2 entity type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fields::FieldValue;

/// A Projects V2 board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Node identifier
    pub id: String,
    /// Project number, unique per owner
    pub number: u64,
    pub title: String,
    pub url: String,
    /// Login of the owning user or organization
    #[serde(default)]
    pub owner: String,
}

/// Pagination state of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// Repository an Issue or Pull Request lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRepository")]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

#[derive(Deserialize)]
struct RawRepository {
    name: String,
    owner: Login,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

impl From<RawRepository> for Repository {
    fn from(raw: RawRepository) -> Self {
        Self {
            owner: raw.owner.login,
            name: raw.name,
        }
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Issue type attached to an Issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueTypeRef {
    pub name: String,
}

/// Shared shape of Issues and Pull Requests on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueContent {
    pub id: String,
    pub number: u64,
    pub title: String,
    /// OPEN, CLOSED or MERGED
    #[serde(alias = "prState")]
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub repository: Option<Repository>,
    /// Only Issues carry a type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<IssueTypeRef>,
}

/// Draft issue living only inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftIssueContent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

/// What a project item wraps, discriminated by `__typename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum ItemContent {
    Issue(IssueContent),
    PullRequest(IssueContent),
    DraftIssue(DraftIssueContent),
    /// Content the token cannot see or a type this client does not model.
    #[serde(other)]
    Unknown,
}

impl ItemContent {
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Issue(c) | Self::PullRequest(c) => Some(&c.title),
            Self::DraftIssue(d) => Some(&d.title),
            Self::Unknown => None,
        }
    }

    /// Issue/PR state; drafts have none.
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::Issue(c) | Self::PullRequest(c) => Some(&c.state),
            _ => None,
        }
    }

    /// Node id of the linked Issue, Pull Request or draft.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Issue(c) | Self::PullRequest(c) => Some(&c.id),
            Self::DraftIssue(d) => Some(&d.id),
            Self::Unknown => None,
        }
    }

    /// Name of the Issue's issue type, if one is set.
    pub fn issue_type_name(&self) -> Option<&str> {
        match self {
            Self::Issue(c) => c.issue_type.as_ref().map(|t| t.name.as_str()),
            _ => None,
        }
    }
}

/// A row on a project board with its normalized field values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub content: Option<ItemContent>,
    /// Only fields set on the item, plus the derived `Type` entry.
    pub field_values: BTreeMap<String, FieldValue>,
}

/// Repository label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Issue type available in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Issue returned by `create_issue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedIssue {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    /// Logins actually assigned
    pub assignees: Vec<String>,
}

/// Issue after its labels were replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledIssue {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub labels: Vec<Label>,
}
