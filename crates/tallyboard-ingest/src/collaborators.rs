//! Contracts for the remote operations the pipeline depends on.
//!
//! Every remote call answers with an explicit [`Outcome`] instead of a loose
//! `{success, error?}` object, so call sites never probe optional fields.

use crate::sources::LocalFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tallyboard_filters::{FilterDefinition, QueryParameters};

/// Result of a collaborator call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure { reason: String },
}

impl<T> Outcome<T> {
    pub fn failure(reason: impl Into<String>) -> Self {
        Outcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure { reason } => Err(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// The chart-ready dataset plus fresh filter options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// Opaque rows handed to chart renderers.
    pub rows: serde_json::Value,
    /// Available values per filter, keyed by source column.
    pub options: BTreeMap<String, Vec<String>>,
}

/// Opaque credential passed through to the sheet collaborator.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// One sheet-processing request.
#[derive(Debug, Clone, Copy)]
pub struct SheetRequest<'a> {
    pub url: &'a str,
    pub auth_token: &'a AuthToken,
    pub selected_range: &'a str,
    /// Position of the slot in the source layout; the backend derives the
    /// dataset name from it.
    pub slot_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProcessed {
    pub dataset_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Upload,
    Dashboard,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Upload => f.write_str("upload"),
            ViewMode::Dashboard => f.write_str("dashboard"),
        }
    }
}

#[async_trait]
pub trait UploadCollaborator: Send + Sync {
    /// Submit every populated local file in one batch.
    async fn upload_files(&self, files: &[LocalFile]) -> Outcome<()>;
}

#[async_trait]
pub trait SheetCollaborator: Send + Sync {
    async fn process_external_sheet(&self, request: SheetRequest<'_>) -> Outcome<SheetProcessed>;
}

#[async_trait]
pub trait FetchCollaborator: Send + Sync {
    async fn fetch_aggregate(&self, params: &QueryParameters) -> Outcome<AggregateResult>;
}

/// Receives view-mode transitions (upload screen vs. dashboard screen).
pub trait ViewModeSink: Send + Sync {
    fn set_view_mode(&self, mode: ViewMode);
}

/// Housekeeping calls around the datasets the backend holds.
#[async_trait]
pub trait CatalogCollaborator: Send + Sync {
    /// Tell the backend which filters exist and how they depend on each other.
    async fn publish_filter_config(&self, filters: &[FilterDefinition]) -> Outcome<()>;

    /// Drop a dataset produced by an earlier upload or sheet run.
    async fn clear_dataset(&self, dataset_name: &str) -> Outcome<()>;

    /// Worksheet titles of a remote spreadsheet.
    async fn sheet_names(&self, url: &str, auth_token: &AuthToken) -> Outcome<Vec<String>>;
}

/// Catalog that accepts everything; for backends without housekeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCatalog;

#[async_trait]
impl CatalogCollaborator for NoopCatalog {
    async fn publish_filter_config(&self, _filters: &[FilterDefinition]) -> Outcome<()> {
        Outcome::Success(())
    }

    async fn clear_dataset(&self, _dataset_name: &str) -> Outcome<()> {
        Outcome::Success(())
    }

    async fn sheet_names(&self, _url: &str, _auth_token: &AuthToken) -> Outcome<Vec<String>> {
        Outcome::Success(Vec::new())
    }
}
