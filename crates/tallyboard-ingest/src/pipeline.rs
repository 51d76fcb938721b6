//! Ordered ingestion: upload local files, process external sheets one by
//! one, fetch the aggregate, switch to the dashboard view.

use crate::collaborators::{
    AggregateResult, AuthToken, FetchCollaborator, Outcome, SheetCollaborator, SheetRequest,
    UploadCollaborator, ViewMode, ViewModeSink,
};
use crate::sources::SourceSlots;
use std::sync::Arc;
use tallyboard_filters::QueryParameters;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestionError {
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("processing sheet in slot {slot_index} failed: {reason}")]
    SheetProcessingFailed { slot_index: usize, reason: String },
    #[error("fetching aggregate failed: {0}")]
    FetchFailed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestionOutcome {
    /// No local file populated and no external sheet with a URL.
    NothingToDo,
    Completed(AggregateResult),
    /// The caller's state moved on before the view switch; the aggregate
    /// was dropped and the view left alone.
    Superseded,
}

/// Runs the ingestion steps against the configured collaborators.
#[derive(Clone)]
pub struct IngestionPipeline {
    uploader: Arc<dyn UploadCollaborator>,
    sheets: Arc<dyn SheetCollaborator>,
    fetcher: Arc<dyn FetchCollaborator>,
    view: Arc<dyn ViewModeSink>,
}

impl IngestionPipeline {
    pub fn new(
        uploader: Arc<dyn UploadCollaborator>,
        sheets: Arc<dyn SheetCollaborator>,
        fetcher: Arc<dyn FetchCollaborator>,
        view: Arc<dyn ViewModeSink>,
    ) -> Self {
        Self {
            uploader,
            sheets,
            fetcher,
            view,
        }
    }

    pub fn fetcher(&self) -> &Arc<dyn FetchCollaborator> {
        &self.fetcher
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// `params` is evaluated right before the fetch so it sees any filter
    /// edits made while earlier steps were in flight. Dataset names written
    /// into `slots` by step 2 stay there even if a later step fails.
    pub async fn run<F>(
        &self,
        slots: &mut SourceSlots,
        auth_token: &AuthToken,
        params: F,
    ) -> Result<IngestionOutcome, IngestionError>
    where
        F: FnOnce() -> QueryParameters + Send,
    {
        self.run_while_current(slots, auth_token, params, || true)
            .await
    }

    /// Like [`run`](Self::run), but asks `is_current` after the fetch and
    /// returns [`IngestionOutcome::Superseded`] instead of switching the
    /// view when it says no.
    pub async fn run_while_current<F, C>(
        &self,
        slots: &mut SourceSlots,
        auth_token: &AuthToken,
        params: F,
        is_current: C,
    ) -> Result<IngestionOutcome, IngestionError>
    where
        F: FnOnce() -> QueryParameters + Send,
        C: Fn() -> bool + Send,
    {
        if !slots.has_work() {
            tracing::debug!("no populated sources, skipping ingestion");
            return Ok(IngestionOutcome::NothingToDo);
        }

        let files = slots.local_files();
        if !files.is_empty() {
            tracing::info!(files = files.len(), "uploading local files");
            if let Outcome::Failure { reason } = self.uploader.upload_files(&files).await {
                tracing::warn!(%reason, "upload failed");
                return Err(IngestionError::UploadFailed(reason));
            }
        }

        // Sequential on purpose: the backend names datasets by slot position.
        let pending: Vec<(usize, String, String)> = slots
            .sheets()
            .filter(|(_, sheet)| sheet.is_processable())
            .map(|(index, sheet)| {
                (
                    index,
                    sheet.url.trim().to_string(),
                    sheet.range().unwrap_or_default().to_string(),
                )
            })
            .collect();
        for (slot_index, url, range) in pending {
            tracing::info!(slot_index, %range, "processing external sheet");
            let request = SheetRequest {
                url: &url,
                auth_token,
                selected_range: &range,
                slot_index,
            };
            match self.sheets.process_external_sheet(request).await {
                Outcome::Success(processed) => {
                    if let (Some(name), Some(sheet)) =
                        (processed.dataset_name, slots.sheet_mut(slot_index))
                    {
                        tracing::debug!(slot_index, dataset = %name, "sheet processed");
                        sheet.dataset_name = Some(name);
                    }
                }
                Outcome::Failure { reason } => {
                    tracing::warn!(slot_index, %reason, "sheet processing failed");
                    return Err(IngestionError::SheetProcessingFailed { slot_index, reason });
                }
            }
        }

        let params = params();
        tracing::debug!(params = params.len(), "fetching aggregate");
        let aggregate = match self.fetcher.fetch_aggregate(&params).await {
            Outcome::Success(aggregate) => aggregate,
            Outcome::Failure { reason } => {
                tracing::warn!(%reason, "aggregate fetch failed");
                return Err(IngestionError::FetchFailed(reason));
            }
        };

        if !is_current() {
            tracing::debug!("aggregate superseded before view switch");
            return Ok(IngestionOutcome::Superseded);
        }
        self.view.set_view_mode(ViewMode::Dashboard);
        Ok(IngestionOutcome::Completed(aggregate))
    }
}
