//! Project item retrieval and filtering.
//!
//! Unfiltered reads return exactly one API page. Filtered reads scan the
//! unfiltered traversal page by page, over-fetching to save round trips, and
//! stop once `limit` matches are collected. The cursor handed back always
//! points into that unfiltered traversal: when the scan stops in the middle
//! of a page it is the edge cursor of the last match, so a resumed scan picks
//! up with the first unscanned item.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::client::ProjectsClient;
use crate::error::{Error, Result};
use crate::fields::{FieldSchema, Nodes, RawFieldValue, TYPE_FIELD};
use crate::models::{Item, ItemContent, PageInfo};

/// Maximum `first` the API accepts for a connection.
pub const MAX_PAGE_SIZE: usize = 100;

/// Filtered scans request this many items per wanted match.
pub const OVERFETCH_FACTOR: usize = 3;

/// Field values fetched per item.
const FIELD_VALUES_PER_ITEM: usize = 50;

/// Single predicate applied to items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFilter {
    /// Issue/PR state, e.g. `OPEN`.
    State(String),
    /// Custom field name and display value.
    Field { name: String, value: String },
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::State(state) => item
                .content
                .as_ref()
                .and_then(ItemContent::state)
                .is_some_and(|s| s.eq_ignore_ascii_case(state)),
            Self::Field { name, value } => {
                let wanted = name.to_lowercase();
                item.field_values
                    .iter()
                    .find(|(field, _)| field.to_lowercase() == wanted)
                    .is_some_and(|(_, v)| v.matches(value))
            }
        }
    }
}

/// Validated arguments of [`ProjectsClient::get_project_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub limit: usize,
    pub filter: Option<ItemFilter>,
    pub cursor: Option<String>,
}

impl ItemQuery {
    /// Build a query from loose tool arguments.
    ///
    /// Blank strings count as absent. At most one of `state` and
    /// `filter_field_name` may be given, and a field name needs a value.
    pub fn new(
        limit: usize,
        state: Option<&str>,
        filter_field_name: Option<&str>,
        filter_field_value: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Self> {
        fn present(s: Option<&str>) -> Option<&str> {
            s.map(str::trim).filter(|s| !s.is_empty())
        }
        let state = present(state);
        let field_name = present(filter_field_name);
        let field_value = present(filter_field_value);

        if limit == 0 {
            return Err(Error::validation("limit must be at least 1"));
        }

        let filter = match (state, field_name, field_value) {
            (Some(_), Some(_), _) => {
                return Err(Error::validation(
                    "Cannot filter by both 'state' and a custom field ('filter_field_name') simultaneously",
                ))
            }
            (_, None, Some(_)) => {
                return Err(Error::validation(
                    "'filter_field_name' is required when 'filter_field_value' is set",
                ))
            }
            (None, Some(_), None) => {
                return Err(Error::validation(
                    "'filter_field_value' is required when 'filter_field_name' is set",
                ))
            }
            (Some(state), None, None) => Some(ItemFilter::State(state.to_string())),
            (None, Some(name), Some(value)) => Some(ItemFilter::Field {
                name: name.to_string(),
                value: value.to_string(),
            }),
            (None, None, None) => None,
        };

        Ok(Self {
            limit,
            filter,
            cursor: present(cursor).map(ToString::to_string),
        })
    }

    /// Unfiltered query for the first `limit` items.
    pub fn first(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            filter: None,
            cursor: None,
        }
    }
}

/// Why a custom-field filter matched nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDiagnostics {
    pub field_name: String,
    pub field_found: bool,
    /// Type of the field, when found.
    pub field_type: Option<String>,
    /// Option names or iteration titles of the field.
    pub known_values: Vec<String>,
    pub items_scanned: usize,
}

impl FilterDiagnostics {
    fn from_schema(schema: &FieldSchema, field_name: &str, items_scanned: usize) -> Self {
        match schema.get(field_name) {
            Some(field) => Self {
                field_name: field.name.clone(),
                field_found: true,
                field_type: Some(field.kind.type_name().to_string()),
                known_values: field.kind.known_values(),
                items_scanned,
            },
            // Filled per item from the issue's issue type.
            None if field_name.eq_ignore_ascii_case(TYPE_FIELD) => Self {
                field_name: TYPE_FIELD.to_string(),
                field_found: true,
                field_type: Some(TYPE_FIELD.to_string()),
                known_values: Vec::new(),
                items_scanned,
            },
            None => Self {
                field_name: field_name.to_string(),
                field_found: false,
                field_type: None,
                known_values: Vec::new(),
                items_scanned,
            },
        }
    }
}

impl std::fmt::Display for FilterDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.field_found {
            return write!(f, "Field '{}' does not exist on this project", self.field_name);
        }
        write!(
            f,
            "Field '{}' ({}) exists; scanned {} items without a match",
            self.field_name,
            self.field_type.as_deref().unwrap_or("Unknown"),
            self.items_scanned
        )?;
        if !self.known_values.is_empty() {
            write!(f, ". Known values: {:?}", self.known_values)?;
        }
        Ok(())
    }
}

/// One page of (possibly filtered) items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemsPage {
    pub items: Vec<Item>,
    pub page_info: PageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<FilterDiagnostics>,
}

const PROJECT_ITEMS_QUERY: &str = r"
    query ProjectItems($owner: String!, $number: Int!, $first: Int!, $after: String, $fieldValues: Int!) {
        repositoryOwner(login: $owner) {
            ... on ProjectV2Owner {
                projectV2(number: $number) {
                    items(first: $first, after: $after) {
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                        edges {
                            cursor
                            node {
                                id
                                content {
                                    __typename
                                    ... on Issue {
                                        id
                                        number
                                        title
                                        state
                                        url
                                        repository {
                                            name
                                            owner {
                                                login
                                            }
                                        }
                                        issueType {
                                            name
                                        }
                                    }
                                    ... on PullRequest {
                                        id
                                        number
                                        title
                                        prState: state
                                        url
                                        repository {
                                            name
                                            owner {
                                                login
                                            }
                                        }
                                    }
                                    ... on DraftIssue {
                                        id
                                        title
                                        body
                                    }
                                }
                                fieldValues(first: $fieldValues) {
                                    nodes {
                                        __typename
                                        ... on ProjectV2ItemFieldTextValue {
                                            text
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                        ... on ProjectV2ItemFieldNumberValue {
                                            number
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                        ... on ProjectV2ItemFieldDateValue {
                                            date
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                        ... on ProjectV2ItemFieldSingleSelectValue {
                                            name
                                            optionId
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                        ... on ProjectV2ItemFieldIterationValue {
                                            title
                                            iterationId
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                        ... on ProjectV2ItemFieldLabelValue {
                                            labels(first: 20) {
                                                nodes {
                                                    name
                                                }
                                            }
                                            field {
                                                ... on ProjectV2FieldCommon {
                                                    name
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemConnection {
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<ItemEdge>,
}

#[derive(Debug, Deserialize)]
struct ItemEdge {
    cursor: String,
    node: Option<RawItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    id: String,
    #[serde(default)]
    content: Option<Value>,
    field_values: Nodes<Option<RawFieldValue>>,
}

impl RawItem {
    fn into_item(self) -> Item {
        let content = self.content.map(|raw| {
            serde_json::from_value(raw).unwrap_or_else(|e| {
                debug!(item_id = %self.id, error = %e, "Unrecognized item content");
                ItemContent::Unknown
            })
        });

        let mut field_values: BTreeMap<_, _> = self
            .field_values
            .nodes
            .into_iter()
            .flatten()
            .filter_map(RawFieldValue::normalize)
            .collect();

        if let Some(type_name) = content.as_ref().and_then(ItemContent::issue_type_name) {
            field_values
                .entry(TYPE_FIELD.to_string())
                .or_insert_with(|| crate::fields::FieldValue::Type(type_name.to_string()));
        }

        Item {
            id: self.id,
            content,
            field_values,
        }
    }
}

impl ProjectsClient {
    /// Fetch one page of project items, optionally filtered.
    ///
    /// Without a filter the page is returned as the API produced it. With a
    /// filter the unfiltered traversal is scanned until `limit` items match or
    /// the project runs out of items. A custom-field filter that matches
    /// nothing on a first page also reports [`FilterDiagnostics`].
    #[instrument(skip(self))]
    pub async fn get_project_items(
        &self,
        owner: &str,
        project_number: u64,
        query: &ItemQuery,
    ) -> Result<ItemsPage> {
        let Some(filter) = &query.filter else {
            let page_size = query.limit.min(MAX_PAGE_SIZE);
            let page = self
                .fetch_item_page(owner, project_number, page_size, query.cursor.as_deref())
                .await?;
            return Ok(ItemsPage {
                items: page
                    .edges
                    .into_iter()
                    .filter_map(|edge| edge.node.map(RawItem::into_item))
                    .collect(),
                page_info: page.page_info,
                diagnostics: None,
            });
        };

        let page_size = query
            .limit
            .saturating_mul(OVERFETCH_FACTOR)
            .min(MAX_PAGE_SIZE);
        let mut after = query.cursor.clone();
        let mut matched = Vec::new();
        let mut scanned = 0;
        let mut pages = 0;

        let page_info = 'scan: loop {
            let page = self
                .fetch_item_page(owner, project_number, page_size, after.as_deref())
                .await?;
            pages += 1;

            let edge_count = page.edges.len();
            for (index, edge) in page.edges.into_iter().enumerate() {
                scanned += 1;
                let Some(node) = edge.node else { continue };
                let item = node.into_item();
                if !filter.matches(&item) {
                    continue;
                }
                matched.push(item);
                if matched.len() == query.limit {
                    break 'scan PageInfo {
                        has_next_page: index + 1 < edge_count || page.page_info.has_next_page,
                        end_cursor: Some(edge.cursor),
                    };
                }
            }

            match page.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(cursor),
                } => after = Some(cursor),
                exhausted => {
                    break PageInfo {
                        has_next_page: false,
                        end_cursor: exhausted.end_cursor,
                    }
                }
            }
        };

        debug!(
            pages,
            scanned,
            matched = matched.len(),
            "Filtered scan finished"
        );

        let diagnostics = match filter {
            ItemFilter::Field { name, .. } if matched.is_empty() && query.cursor.is_none() => {
                match self.describe_fields(owner, project_number).await {
                    Ok(schema) => Some(FilterDiagnostics::from_schema(&schema, name, scanned)),
                    Err(e) => {
                        warn!(error = %e, "Could not fetch field details for diagnostics");
                        None
                    }
                }
            }
            _ => None,
        };

        Ok(ItemsPage {
            items: matched,
            page_info,
            diagnostics,
        })
    }

    async fn fetch_item_page(
        &self,
        owner: &str,
        project_number: u64,
        first: usize,
        after: Option<&str>,
    ) -> Result<ItemConnection> {
        let page: ItemConnection = self
            .query(
                PROJECT_ITEMS_QUERY,
                json!({
                    "owner": owner,
                    "number": project_number,
                    "first": first,
                    "after": after,
                    "fieldValues": FIELD_VALUES_PER_ITEM,
                }),
                "/repositoryOwner/projectV2/items",
            )
            .await?;
        debug!(
            first,
            received = page.edges.len(),
            has_next_page = page.page_info.has_next_page,
            "Fetched item page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;

    fn item(state: Option<&str>, values: &[(&str, FieldValue)]) -> Item {
        Item {
            id: "PVTI_1".to_string(),
            content: state.map(|s| {
                ItemContent::Issue(crate::models::IssueContent {
                    id: "I_1".to_string(),
                    number: 1,
                    title: "t".to_string(),
                    state: s.to_string(),
                    url: "https://github.com/o/r/issues/1".to_string(),
                    repository: None,
                    issue_type: None,
                })
            }),
            field_values: values
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_query_rejects_state_and_field_together() {
        let err = ItemQuery::new(10, Some("OPEN"), Some("Status"), Some("open"), None).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_query_requires_name_and_value_pair() {
        assert!(ItemQuery::new(10, None, Some("Status"), None, None).is_err());
        assert!(ItemQuery::new(10, None, None, Some("Done"), None).is_err());
        assert!(ItemQuery::new(0, None, None, None, None).is_err());
    }

    #[test]
    fn test_query_treats_blank_as_absent() {
        let query = ItemQuery::new(5, Some(""), Some("Status"), Some("Done"), Some(" ")).unwrap();
        assert_eq!(
            query.filter,
            Some(ItemFilter::Field {
                name: "Status".to_string(),
                value: "Done".to_string()
            })
        );
        assert_eq!(query.cursor, None);
    }

    #[test]
    fn test_state_filter() {
        let filter = ItemFilter::State("open".to_string());
        assert!(filter.matches(&item(Some("OPEN"), &[])));
        assert!(!filter.matches(&item(Some("CLOSED"), &[])));
        assert!(!filter.matches(&item(None, &[])));
    }

    #[test]
    fn test_field_filter_is_case_insensitive_and_exact() {
        let done = item(
            Some("OPEN"),
            &[("Status", FieldValue::SingleSelect("Done".to_string()))],
        );
        let filter = |value: &str| ItemFilter::Field {
            name: "status".to_string(),
            value: value.to_string(),
        };
        assert!(filter("DONE").matches(&done));
        assert!(!filter("Don").matches(&done));
        assert!(!filter("Done").matches(&item(Some("OPEN"), &[])));
    }

    #[test]
    fn test_raw_item_synthesizes_type() {
        let raw: RawItem = serde_json::from_value(json!({
            "id": "PVTI_1",
            "content": {
                "__typename": "Issue", "id": "I_1", "number": 7, "title": "Crash",
                "state": "OPEN", "url": "https://github.com/o/r/issues/7",
                "repository": {"name": "r", "owner": {"login": "o"}},
                "issueType": {"name": "Bug"}
            },
            "fieldValues": {"nodes": [
                {"__typename": "ProjectV2ItemFieldSingleSelectValue", "name": "Todo", "optionId": "x", "field": {"name": "Status"}},
                {"__typename": "ProjectV2ItemFieldUserValue"},
                null
            ]}
        }))
        .unwrap();

        let item = raw.into_item();
        assert_eq!(
            item.field_values.get("Type"),
            Some(&FieldValue::Type("Bug".to_string()))
        );
        assert_eq!(
            item.field_values.get("Status"),
            Some(&FieldValue::SingleSelect("Todo".to_string()))
        );
        assert_eq!(item.field_values.len(), 2);
    }

    #[test]
    fn test_diagnostics_distinguish_missing_field() {
        let schema = FieldSchema::default();
        let diag = FilterDiagnostics::from_schema(&schema, "Stauts", 12);
        assert!(!diag.field_found);
        assert_eq!(diag.to_string(), "Field 'Stauts' does not exist on this project");
    }
}
