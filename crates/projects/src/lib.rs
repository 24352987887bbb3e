#![warn(clippy::pedantic)]
// Allow common pedantic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::map_unwrap_or)]

//! # GitHub Projects
//!
//! A GraphQL client for GitHub Projects V2, plus the tool adapter that lets
//! an agent drive it over stdio.
//!
//! This crate provides:
//! - A retrying GraphQL transport with typed errors
//! - A normalized model of project field types and values
//! - Item listing with state and custom-field filters, resumable by cursor
//! - Issue, item and field mutations, including ordered multi-step flows
//!   that report partial failures instead of hiding them
//!
//! ## Example
//!
//! ```rust,ignore
//! use github_projects::{Config, ItemQuery, ProjectsClient};
//!
//! let client = ProjectsClient::new(Config::default())?;
//! let query = ItemQuery::new(20, None, Some("Status"), Some("In Progress"), None)?;
//! let page = client.get_project_items("acme", 7, &query).await?;
//! ```

// Configuration and errors
pub mod config;
pub mod error;

// GraphQL transport
pub mod transport;

// Entities and the field type model
pub mod fields;
pub mod models;

// Client facade and operations
pub mod client;
pub mod items;
pub mod mutations;

// Tool adapter
pub mod mcp;

// Re-export key types for convenience
pub use client::ProjectsClient;
pub use config::Config;
pub use error::{Error, GitHubClientError, Result};
pub use fields::{Field, FieldKind, FieldSchema, FieldValue, FieldWriteValue};
pub use items::{FilterDiagnostics, ItemFilter, ItemQuery, ItemsPage};
pub use models::{Item, ItemContent, PageInfo, Project};
pub use mutations::{CompositeOutcome, DateUpdate, DateWriteFailure, DateWrites, Step, StepStatus};
pub use transport::{GraphqlResponse, GraphqlTransport, HttpTransport};
