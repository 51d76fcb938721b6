//! Dashboard state: filters, source slots, the current aggregate, and the
//! two refresh paths the scheduler drives.

use crate::events::{RunKind, SessionEvent, SessionEventHandler};
use crate::scheduler::{RefreshTarget, RunOutcome};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tallyboard_filters::{
    build_parameters, FilterGraph, FilterId, FilterStateStore, QueryParameters, SelectionChange,
    SelectionError,
};
use tallyboard_ingest::{
    AggregateResult, AuthToken, CatalogCollaborator, FetchCollaborator, IngestionOutcome,
    IngestionPipeline, Outcome, SheetCollaborator, SlotError, SourceDescriptor, SourceSlots,
    UploadCollaborator, ViewMode, ViewModeSink,
};
use tallyboard_storage::{load_json, save_json, KeyValueStore};
use uuid::Uuid;

/// Persistence key for the slot layout.
pub const SOURCES_KEY: &str = "sources";
/// Persistence key for the filter declarations the dashboard ran with.
pub const FILTERS_KEY: &str = "filters";

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// The remote side of a dashboard.
#[derive(Clone)]
pub struct Collaborators {
    pub uploader: Arc<dyn UploadCollaborator>,
    pub sheets: Arc<dyn SheetCollaborator>,
    pub fetcher: Arc<dyn FetchCollaborator>,
    pub catalog: Arc<dyn CatalogCollaborator>,
    /// Told about view-mode transitions; the dashboard tracks the mode too.
    pub view: Arc<dyn ViewModeSink>,
}

impl Collaborators {
    /// Use one backend for every remote operation.
    pub fn from_backend<B>(backend: Arc<B>, view: Arc<dyn ViewModeSink>) -> Self
    where
        B: UploadCollaborator
            + SheetCollaborator
            + FetchCollaborator
            + CatalogCollaborator
            + 'static,
    {
        Self {
            uploader: backend.clone(),
            sheets: backend.clone(),
            fetcher: backend.clone(),
            catalog: backend,
            view,
        }
    }
}

/// Remembers the last view mode and forwards it.
struct ViewTracker {
    current: RwLock<ViewMode>,
    downstream: Arc<dyn ViewModeSink>,
}

impl ViewModeSink for ViewTracker {
    fn set_view_mode(&self, mode: ViewMode) {
        *self.current.write() = mode;
        self.downstream.set_view_mode(mode);
    }
}

/// One dashboard: what is selected, where data comes from and what came
/// back.
pub struct Dashboard {
    filters: Mutex<FilterStateStore>,
    slots: Mutex<SourceSlots>,
    auth_token: RwLock<AuthToken>,
    aggregate: RwLock<Option<AggregateResult>>,
    last_error: RwLock<Option<String>>,
    /// Bumped when a run starts and on every reset; a response whose
    /// generation is no longer current is dropped.
    generation: AtomicU64,
    pipeline: IngestionPipeline,
    catalog: Arc<dyn CatalogCollaborator>,
    view: Arc<ViewTracker>,
    store: Arc<dyn KeyValueStore>,
    event_handlers: Vec<SessionEventHandler>,
}

impl Dashboard {
    /// Restore the slot layout from `store` and record the filter
    /// declarations there.
    ///
    /// A stored layout that cannot be read is logged and replaced by empty
    /// slots; persistence never blocks startup.
    pub fn open(
        graph: Arc<FilterGraph>,
        slot_count: usize,
        collaborators: Collaborators,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let slots = match load_json::<SourceSlots>(store.as_ref(), SOURCES_KEY) {
            Ok(Some(saved)) => saved.resized(slot_count),
            Ok(None) => SourceSlots::with_len(slot_count),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring stored source layout");
                SourceSlots::with_len(slot_count)
            }
        };
        if let Err(e) = save_json(store.as_ref(), FILTERS_KEY, graph.definitions()) {
            tracing::warn!(error = %e, "could not record filter declarations");
        }
        tracing::debug!(
            filters = graph.len(),
            sources = slots.iter().count(),
            "dashboard opened"
        );

        let view = Arc::new(ViewTracker {
            current: RwLock::new(ViewMode::Upload),
            downstream: collaborators.view,
        });
        let pipeline = IngestionPipeline::new(
            collaborators.uploader,
            collaborators.sheets,
            collaborators.fetcher,
            view.clone(),
        );

        Self {
            filters: Mutex::new(FilterStateStore::new(graph)),
            slots: Mutex::new(slots),
            auth_token: RwLock::new(AuthToken::default()),
            aggregate: RwLock::new(None),
            last_error: RwLock::new(None),
            generation: AtomicU64::new(0),
            pipeline,
            catalog: collaborators.catalog,
            view,
            store,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn on_event(&mut self, handler: SessionEventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: SessionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Tell the catalog which filters this dashboard declares.
    pub async fn publish_filters(&self) {
        let definitions = self.filters.lock().graph().definitions().to_vec();
        if let Outcome::Failure { reason } =
            self.catalog.publish_filter_config(&definitions).await
        {
            tracing::warn!(%reason, "publishing filter config failed");
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn aggregate(&self) -> Option<AggregateResult> {
        self.aggregate.read().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn view_mode(&self) -> ViewMode {
        *self.view.current.read()
    }

    pub fn slots(&self) -> SourceSlots {
        self.slots.lock().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Current filter parameters.
    pub fn parameters(&self) -> QueryParameters {
        build_parameters(&self.filters.lock())
    }

    /// Run `f` against the filter state.
    pub fn with_filters<R>(&self, f: impl FnOnce(&FilterStateStore) -> R) -> R {
        f(&self.filters.lock())
    }

    pub fn set_auth_token(&self, token: AuthToken) {
        *self.auth_token.write() = token;
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Apply a selection edit; returns the dependents that were reset.
    pub fn select(
        &self,
        filter_id: &str,
        change: SelectionChange,
    ) -> Result<Vec<FilterId>, SelectionError> {
        let reset = self.filters.lock().set_selection(filter_id, change)?;
        if !reset.is_empty() {
            tracing::debug!(filter = filter_id, ?reset, "dependent selections reset");
        }
        Ok(reset)
    }

    /// Put `descriptor` into slot `index` (or empty it with `None`).
    ///
    /// The layout is persisted on every change. A replaced sheet that had
    /// produced a dataset asks the catalog to drop it. Returns `true` when no
    /// source is left, in which case the dashboard has been cleared.
    pub async fn set_source(
        &self,
        index: usize,
        descriptor: Option<SourceDescriptor>,
    ) -> Result<bool, DashboardError> {
        let (previous, empty) = {
            let mut slots = self.slots.lock();
            let previous = slots.set(index, descriptor)?;
            let empty = slots.iter().next().is_none();
            (previous, empty)
        };
        self.persist_slots();

        if let Some(SourceDescriptor::ExternalSheet(sheet)) = previous {
            if let Some(name) = sheet.dataset_name {
                tracing::info!(slot = index, dataset = %name, "dropping dataset of replaced sheet");
                if let Outcome::Failure { reason } = self.catalog.clear_dataset(&name).await {
                    tracing::warn!(dataset = %name, %reason, "clearing dataset failed");
                }
            }
        }

        if empty {
            self.reset_to_upload();
            self.emit(SessionEvent::SourcesCleared);
        }
        Ok(empty)
    }

    pub async fn clear_source(&self, index: usize) -> Result<bool, DashboardError> {
        self.set_source(index, None).await
    }

    /// Empty every filter, drop the aggregate and forget the last error.
    /// Responses still in flight will be discarded.
    pub fn clear_all(&self) {
        self.filters.lock().clear_all();
        *self.aggregate.write() = None;
        *self.last_error.write() = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("dashboard cleared");
    }

    fn reset_to_upload(&self) {
        self.clear_all();
        self.change_view(ViewMode::Upload);
    }

    fn change_view(&self, mode: ViewMode) {
        let previous = self.view_mode();
        self.view.set_view_mode(mode);
        if previous != mode {
            self.emit(SessionEvent::ViewModeChanged { mode });
        }
    }

    fn persist_slots(&self) {
        let slots = self.slots();
        if let Err(e) = save_json(self.store.as_ref(), SOURCES_KEY, &slots) {
            tracing::warn!(error = %e, "could not persist source layout");
        }
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    fn begin_run(&self, kind: RunKind) -> (Uuid, u64) {
        let run_id = Uuid::new_v4();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(%run_id, %kind, "run started");
        self.emit(SessionEvent::RunStarted { run_id, kind });
        (run_id, generation)
    }

    fn is_stale(&self, run_id: Uuid, kind: RunKind, generation: u64) -> bool {
        if self.generation() == generation {
            return false;
        }
        tracing::debug!(%run_id, %kind, "discarding stale response");
        self.emit(SessionEvent::StaleResponseDiscarded { run_id, kind });
        true
    }

    fn apply_aggregate(&self, run_id: Uuid, kind: RunKind, aggregate: AggregateResult) {
        let options = aggregate.options.len();
        self.filters.lock().apply_options(&aggregate.options);
        *self.aggregate.write() = Some(aggregate);
        *self.last_error.write() = None;
        tracing::info!(%run_id, %kind, options, "run finished");
        self.emit(SessionEvent::RunFinished {
            run_id,
            kind,
            options,
        });
    }

    fn fail(&self, run_id: Uuid, kind: RunKind, message: String) -> RunOutcome {
        *self.aggregate.write() = None;
        *self.last_error.write() = Some(message.clone());
        tracing::warn!(%run_id, %kind, %message, "run failed");
        self.emit(SessionEvent::RunFailed {
            run_id,
            kind,
            message: message.clone(),
        });
        RunOutcome::Failed(message)
    }
}

#[async_trait]
impl RefreshTarget for Dashboard {
    async fn refresh_query(&self) -> RunOutcome {
        let kind = RunKind::Query;
        let (run_id, generation) = self.begin_run(kind);
        let params = self.parameters();

        let outcome = self.pipeline.fetcher().fetch_aggregate(&params).await;
        if self.is_stale(run_id, kind, generation) {
            return RunOutcome::Discarded;
        }
        match outcome {
            Outcome::Success(aggregate) => {
                self.apply_aggregate(run_id, kind, aggregate);
                RunOutcome::Succeeded
            }
            Outcome::Failure { reason } => self.fail(run_id, kind, reason),
        }
    }

    async fn reingest(&self) -> RunOutcome {
        let kind = RunKind::Full;
        let (run_id, generation) = self.begin_run(kind);
        let previous_view = self.view_mode();
        let mut snapshot = self.slots();
        let token = self.auth_token.read().clone();

        let result = self
            .pipeline
            .run_while_current(
                &mut snapshot,
                &token,
                || self.parameters(),
                || self.generation() == generation,
            )
            .await;

        self.slots.lock().merge_dataset_names(&snapshot);
        self.persist_slots();

        if self.is_stale(run_id, kind, generation) {
            return RunOutcome::Discarded;
        }
        match result {
            Ok(IngestionOutcome::NothingToDo) => {
                tracing::info!(%run_id, "no sources, clearing dashboard");
                self.reset_to_upload();
                RunOutcome::NothingToDo
            }
            Ok(IngestionOutcome::Completed(aggregate)) => {
                self.apply_aggregate(run_id, kind, aggregate);
                let mode = self.view_mode();
                if mode != previous_view {
                    self.emit(SessionEvent::ViewModeChanged { mode });
                }
                RunOutcome::Succeeded
            }
            // is_stale above saw the same moved generation
            Ok(IngestionOutcome::Superseded) => RunOutcome::Discarded,
            Err(e) => self.fail(run_id, kind, e.to_string()),
        }
    }
}
