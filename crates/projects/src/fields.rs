//! Project field schema and value normalization.
//!
//! The API reports every custom field type with its own value shape. This
//! module folds them into [`FieldValue`] for reads and resolves caller input
//! into [`FieldWriteValue`] for writes, with the behavior attached to
//! [`FieldKind`] rather than spread over type-name checks.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::ProjectsClient;
use crate::error::{Error, Result};
use crate::models::PageInfo;

/// Name of the synthetic field derived from an Issue's issue type.
pub const TYPE_FIELD: &str = "Type";

/// Option of a single-select field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

/// Iteration of an iteration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationOption {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// Field type, carrying the option/iteration lists where the type has them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    SingleSelect { options: Vec<FieldOption> },
    Iteration { iterations: Vec<IterationOption> },
    Labels,
    /// Built-in fields (title, assignees, milestone, ...) that are not written through this model.
    Other { data_type: String },
}

impl FieldKind {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Text => "Text",
            Self::Number => "Number",
            Self::Date => "Date",
            Self::SingleSelect { .. } => "SingleSelect",
            Self::Iteration { .. } => "Iteration",
            Self::Labels => "Labels",
            Self::Other { data_type } => data_type,
        }
    }

    /// Option names or iteration titles, in API order.
    pub fn known_values(&self) -> Vec<String> {
        match self {
            Self::SingleSelect { options } => options.iter().map(|o| o.name.clone()).collect(),
            Self::Iteration { iterations } => iterations.iter().map(|i| i.title.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

/// A custom field of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl Field {
    /// Turn caller input into a value the API accepts for this field.
    ///
    /// Option and iteration names match case-insensitively and must match
    /// exactly one entry. Labels take comma separated label node ids.
    pub fn resolve_write_value(&self, value: &str) -> Result<FieldWriteValue> {
        let value = value.trim();
        match &self.kind {
            FieldKind::Text => Ok(FieldWriteValue::Text(value.to_string())),
            FieldKind::Number => value.parse::<f64>().map(FieldWriteValue::Number).map_err(|_| {
                Error::validation(format!(
                    "Field '{}' is a Number field; '{value}' is not a number",
                    self.name
                ))
            }),
            FieldKind::Date => parse_date(value)
                .map(FieldWriteValue::Date)
                .map_err(|reason| Error::validation(format!("Field '{}': {reason}", self.name))),
            FieldKind::SingleSelect { options } => {
                let id = unique_match(&self.name, value, options.iter().map(|o| (&o.name, &o.id)))?;
                Ok(FieldWriteValue::SingleSelectOptionId(id))
            }
            FieldKind::Iteration { iterations } => {
                let id = unique_match(
                    &self.name,
                    value,
                    iterations.iter().map(|i| (&i.title, &i.id)),
                )?;
                Ok(FieldWriteValue::IterationId(id))
            }
            FieldKind::Labels => Ok(FieldWriteValue::LabelIds(split_ids(value))),
            FieldKind::Other { data_type } => Err(Error::validation(format!(
                "Field '{}' has type {data_type}, which cannot be set through field updates",
                self.name
            ))),
        }
    }

    /// Display value of a write value for this field.
    ///
    /// Option and iteration ids are mapped back to their names.
    pub fn normalize(&self, value: &FieldWriteValue) -> Option<FieldValue> {
        match (&self.kind, value) {
            (FieldKind::SingleSelect { options }, FieldWriteValue::SingleSelectOptionId(id)) => {
                options
                    .iter()
                    .find(|o| &o.id == id)
                    .map(|o| FieldValue::SingleSelect(o.name.clone()))
            }
            (FieldKind::Iteration { iterations }, FieldWriteValue::IterationId(id)) => iterations
                .iter()
                .find(|i| &i.id == id)
                .map(|i| FieldValue::Iteration(i.title.clone())),
            (_, FieldWriteValue::Text(s)) => Some(FieldValue::Text(s.clone())),
            (_, FieldWriteValue::Number(n)) => Some(FieldValue::Number(*n)),
            (_, FieldWriteValue::Date(d)) => Some(FieldValue::Date(d.clone())),
            _ => None,
        }
    }
}

fn unique_match<'a>(
    field: &str,
    wanted: &str,
    candidates: impl Iterator<Item = (&'a String, &'a String)> + Clone,
) -> Result<String> {
    let wanted_lower = wanted.to_lowercase();
    let mut matches = candidates
        .clone()
        .filter(|(name, _)| name.to_lowercase() == wanted_lower);

    match (matches.next(), matches.next()) {
        (Some((_, id)), None) => Ok(id.clone()),
        (Some(_), Some(_)) => Err(Error::validation(format!(
            "Value '{wanted}' matches more than one entry of field '{field}'"
        ))),
        (None, _) => {
            let available: Vec<&str> = candidates.map(|(name, _)| name.as_str()).collect();
            Err(Error::validation(format!(
                "Value '{wanted}' not found in field '{field}'. Available: {available:?}"
            )))
        }
    }
}

fn split_ids(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Validate a `YYYY-MM-DD` calendar date.
pub(crate) fn parse_date(value: &str) -> std::result::Result<String, String> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| format!("'{value}' is not a valid YYYY-MM-DD date"))
}

/// Value ready to be sent to the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldWriteValue {
    Text(String),
    Number(f64),
    Date(String),
    SingleSelectOptionId(String),
    IterationId(String),
    /// Applied to the linked Issue/PR, not through the project field mutation.
    LabelIds(Vec<String>),
}

impl FieldWriteValue {
    /// Guess the value kind when only the field id is known.
    ///
    /// The id prefix decides for single-select (`PVTSSF_`), iteration
    /// (`PVTIF_`) and labels (`PVTLSF_`). Anything else is a number if it
    /// parses as one, a date if it is `YYYY-MM-DD`, and text otherwise.
    pub fn infer(field_id: &str, raw: &str) -> Self {
        let raw = raw.trim();
        if field_id.starts_with("PVTSSF_") {
            return Self::SingleSelectOptionId(raw.to_string());
        }
        if field_id.starts_with("PVTIF_") {
            return Self::IterationId(raw.to_string());
        }
        if field_id.starts_with("PVTLSF_") {
            return Self::LabelIds(split_ids(raw));
        }
        if let Ok(n) = raw.parse::<f64>() {
            if n.is_finite() {
                return Self::Number(n);
            }
        }
        match parse_date(raw) {
            Ok(date) if date == raw => Self::Date(date),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// `ProjectV2FieldValue` input object, or `None` for label writes.
    pub fn to_input(&self) -> Option<Value> {
        match self {
            Self::Text(s) => Some(json!({ "text": s })),
            Self::Number(n) => Some(json!({ "number": n })),
            Self::Date(d) => Some(json!({ "date": d })),
            Self::SingleSelectOptionId(id) => Some(json!({ "singleSelectOptionId": id })),
            Self::IterationId(id) => Some(json!({ "iterationId": id })),
            Self::LabelIds(_) => None,
        }
    }
}

/// Normalized field value as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(String),
    SingleSelect(String),
    Iteration(String),
    /// Label names in API order, duplicates kept.
    Labels(Vec<String>),
    /// Issue type name of the linked Issue.
    Type(String),
}

impl FieldValue {
    /// Case-insensitive exact comparison with a filter value.
    ///
    /// Numbers compare numerically; labels match when any label does.
    pub fn matches(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        match self {
            Self::Text(s)
            | Self::Date(s)
            | Self::SingleSelect(s)
            | Self::Iteration(s)
            | Self::Type(s) => eq_ignore_case(s, wanted),
            Self::Number(n) => wanted
                .parse::<f64>()
                .map_or_else(|_| eq_ignore_case(&self.to_string(), wanted), |w| w == *n),
            Self::Labels(labels) => labels.iter().any(|l| eq_ignore_case(l, wanted)),
        }
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s)
            | Self::Date(s)
            | Self::SingleSelect(s)
            | Self::Iteration(s)
            | Self::Type(s) => f.write_str(s),
            #[allow(clippy::float_cmp)]
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Labels(labels) => f.write_str(&labels.join(", ")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelName {
    name: String,
}

/// Item field value exactly as the API returns it.
#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
pub(crate) enum RawFieldValue {
    #[serde(rename = "ProjectV2ItemFieldTextValue")]
    Text {
        text: Option<String>,
        field: FieldRef,
    },
    #[serde(rename = "ProjectV2ItemFieldNumberValue")]
    Number {
        number: Option<f64>,
        field: FieldRef,
    },
    #[serde(rename = "ProjectV2ItemFieldDateValue")]
    Date {
        date: Option<String>,
        field: FieldRef,
    },
    #[serde(rename = "ProjectV2ItemFieldSingleSelectValue")]
    SingleSelect {
        name: Option<String>,
        field: FieldRef,
    },
    #[serde(rename = "ProjectV2ItemFieldIterationValue")]
    Iteration {
        title: Option<String>,
        field: FieldRef,
    },
    #[serde(rename = "ProjectV2ItemFieldLabelValue")]
    Labels {
        labels: Option<Nodes<LabelName>>,
        field: FieldRef,
    },
    #[serde(other)]
    Other,
}

impl RawFieldValue {
    /// Field name and display value; `None` for unset or unsupported values.
    pub(crate) fn normalize(self) -> Option<(String, FieldValue)> {
        let (field, value) = match self {
            Self::Text { text, field } => (field, FieldValue::Text(text?)),
            Self::Number { number, field } => (field, FieldValue::Number(number?)),
            Self::Date { date, field } => (field, FieldValue::Date(date?)),
            Self::SingleSelect { name, field } => (field, FieldValue::SingleSelect(name?)),
            Self::Iteration { title, field } => (field, FieldValue::Iteration(title?)),
            Self::Labels { labels, field } => (
                field,
                FieldValue::Labels(labels?.nodes.into_iter().map(|l| l.name).collect()),
            ),
            Self::Other => return None,
        };
        Some((field.name?, value))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawField {
    id: String,
    name: String,
    data_type: String,
    #[serde(default)]
    options: Option<Vec<FieldOption>>,
    #[serde(default)]
    configuration: Option<IterationConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IterationConfiguration {
    #[serde(default)]
    iterations: Vec<IterationOption>,
    #[serde(default)]
    completed_iterations: Vec<IterationOption>,
}

impl From<RawField> for Field {
    fn from(raw: RawField) -> Self {
        let kind = match raw.data_type.as_str() {
            "TEXT" => FieldKind::Text,
            "NUMBER" => FieldKind::Number,
            "DATE" => FieldKind::Date,
            "SINGLE_SELECT" => FieldKind::SingleSelect {
                options: raw.options.unwrap_or_default(),
            },
            "ITERATION" => FieldKind::Iteration {
                iterations: raw
                    .configuration
                    .map(|c| {
                        c.iterations
                            .into_iter()
                            .chain(c.completed_iterations)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            "LABELS" => FieldKind::Labels,
            other => FieldKind::Other {
                data_type: other.to_string(),
            },
        };
        Self {
            id: raw.id,
            name: raw.name,
            kind,
        }
    }
}

/// All fields of a project in API-declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    pub fields: Vec<Field>,
}

impl FieldSchema {
    /// Case-insensitive lookup; the first declared field wins on collision.
    pub fn get(&self, name: &str) -> Option<&Field> {
        let name = name.trim().to_lowercase();
        self.fields.iter().find(|f| f.name.to_lowercase() == name)
    }

    pub fn by_id(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

const PROJECT_FIELDS_QUERY: &str = r"
    query ProjectFields($owner: String!, $number: Int!, $after: String) {
        repositoryOwner(login: $owner) {
            ... on ProjectV2Owner {
                projectV2(number: $number) {
                    fields(first: 100, after: $after) {
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                        nodes {
                            __typename
                            ... on ProjectV2FieldCommon {
                                id
                                name
                                dataType
                            }
                            ... on ProjectV2SingleSelectField {
                                options {
                                    id
                                    name
                                }
                            }
                            ... on ProjectV2IterationField {
                                configuration {
                                    iterations {
                                        id
                                        title
                                        startDate
                                        duration
                                    }
                                    completedIterations {
                                        id
                                        title
                                        startDate
                                        duration
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
struct FieldConnection {
    page_info: PageInfo,
    nodes: Vec<Option<RawField>>,
}

impl ProjectsClient {
    /// Fetch the field schema of a project, options and iterations included.
    #[instrument(skip(self))]
    pub async fn describe_fields(&self, owner: &str, project_number: u64) -> Result<FieldSchema> {
        let mut schema = FieldSchema::default();
        let mut after: Option<String> = None;

        loop {
            let page: FieldConnection = self
                .query(
                    PROJECT_FIELDS_QUERY,
                    json!({ "owner": owner, "number": project_number, "after": after }),
                    "/repositoryOwner/projectV2/fields",
                )
                .await?;

            schema
                .fields
                .extend(page.nodes.into_iter().flatten().map(Field::from));

            match page.page_info {
                PageInfo {
                    has_next_page: true,
                    end_cursor: Some(cursor),
                } => after = Some(cursor),
                _ => break,
            }
        }

        debug!(fields = schema.len(), "Fetched project fields");
        Ok(schema)
    }
}
