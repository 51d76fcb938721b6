//! End-to-end dashboard behaviour against an in-process backend.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tallyboard_filters::{FilterDefinition, FilterGraph, QueryParameters, SelectionChange};
use tallyboard_ingest::*;
use tallyboard_storage::{load_json, open_store, KeyValueStore, MemoryStore};
use tallyboard_sync::*;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Default)]
struct Backend {
    uploads: Mutex<Vec<Vec<LocalFile>>>,
    fail_upload: Mutex<Option<String>>,
    fetch_delay: Mutex<Duration>,
    fetched: Mutex<Vec<QueryParameters>>,
    cleared: Mutex<Vec<String>>,
    published: Mutex<Vec<FilterDefinition>>,
}

#[async_trait]
impl UploadCollaborator for Backend {
    async fn upload_files(&self, files: &[LocalFile]) -> Outcome<()> {
        self.uploads.lock().push(files.to_vec());
        let failure = self.fail_upload.lock().clone();
        match failure {
            Some(reason) => Outcome::failure(reason),
            None => Outcome::Success(()),
        }
    }
}

#[async_trait]
impl SheetCollaborator for Backend {
    async fn process_external_sheet(&self, request: SheetRequest<'_>) -> Outcome<SheetProcessed> {
        Outcome::Success(SheetProcessed {
            dataset_name: Some(format!("googlesheet{}", request.slot_index + 1)),
        })
    }
}

#[async_trait]
impl FetchCollaborator for Backend {
    async fn fetch_aggregate(&self, params: &QueryParameters) -> Outcome<AggregateResult> {
        self.fetched.lock().push(params.clone());
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut options = BTreeMap::new();
        options.insert("Country".to_string(), vec!["NZ".to_string(), "AU".to_string()]);
        options.insert("City".to_string(), vec!["Auckland".to_string()]);
        Outcome::Success(AggregateResult {
            rows: serde_json::json!({"price_trends": [{"Country": "NZ", "value": 7}]}),
            options,
        })
    }
}

#[async_trait]
impl CatalogCollaborator for Backend {
    async fn publish_filter_config(&self, filters: &[FilterDefinition]) -> Outcome<()> {
        *self.published.lock() = filters.to_vec();
        Outcome::Success(())
    }

    async fn clear_dataset(&self, dataset_name: &str) -> Outcome<()> {
        self.cleared.lock().push(dataset_name.to_string());
        Outcome::Success(())
    }

    async fn sheet_names(&self, _url: &str, _auth_token: &AuthToken) -> Outcome<Vec<String>> {
        Outcome::Success(vec!["Sheet1".to_string()])
    }
}

#[derive(Default)]
struct Screen {
    modes: Mutex<Vec<ViewMode>>,
}

impl ViewModeSink for Screen {
    fn set_view_mode(&self, mode: ViewMode) {
        self.modes.lock().push(mode);
    }
}

fn graph() -> Arc<FilterGraph> {
    Arc::new(
        FilterGraph::new(vec![
            FilterDefinition::top_level("country", "Country"),
            FilterDefinition::dependent("city", "City", &["country"]),
        ])
        .unwrap(),
    )
}

struct Fixture {
    backend: Arc<Backend>,
    screen: Arc<Screen>,
    store: Arc<MemoryStore>,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            backend: Arc::new(Backend::default()),
            screen: Arc::new(Screen::default()),
            store: Arc::new(MemoryStore::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn dashboard(&self) -> Dashboard {
        let mut dashboard = Dashboard::open(
            graph(),
            4,
            Collaborators::from_backend(self.backend.clone(), self.screen.clone()),
            self.store.clone(),
        );
        let events = self.events.clone();
        dashboard.on_event(Box::new(move |event| events.lock().push(event)));
        dashboard
    }

    fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }
}

fn local_file() -> Option<SourceDescriptor> {
    Some(SourceDescriptor::LocalFile(LocalFile::new("sales.xlsx")))
}

fn sheet(url: &str) -> Option<SourceDescriptor> {
    Some(SourceDescriptor::ExternalSheet(ExternalSheet::new(url, "Sheet1")))
}

// ============================================================================
// Dashboard runs
// ============================================================================

#[tokio::test]
async fn test_zero_sources_clears_everything() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    dashboard.with_filters(|f| assert!(f.is_cleared()));

    let outcome = dashboard.reingest().await;

    assert_eq!(outcome, RunOutcome::NothingToDo);
    assert!(dashboard.aggregate().is_none());
    assert_eq!(dashboard.view_mode(), ViewMode::Upload);
    assert!(fx.backend.uploads.lock().is_empty());
    assert!(fx.backend.fetched.lock().is_empty());
}

#[tokio::test]
async fn test_local_file_run_reaches_dashboard() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    dashboard.set_source(0, local_file()).await.unwrap();

    let outcome = dashboard.reingest().await;

    assert_eq!(outcome, RunOutcome::Succeeded);
    assert_eq!(dashboard.view_mode(), ViewMode::Dashboard);
    assert_eq!(*fx.screen.modes.lock(), vec![ViewMode::Dashboard]);
    assert!(dashboard.aggregate().is_some());
    assert_eq!(dashboard.last_error(), None);
    dashboard.with_filters(|f| {
        assert_eq!(f.state("country").unwrap().options, vec!["NZ", "AU"]);
    });

    let events = fx.events();
    assert!(matches!(
        events.first(),
        Some(SessionEvent::RunStarted {
            kind: RunKind::Full,
            ..
        })
    ));
    assert!(events.contains(&SessionEvent::ViewModeChanged {
        mode: ViewMode::Dashboard
    }));
}

#[tokio::test]
async fn test_upload_failure_surfaces_error() {
    let fx = Fixture::new();
    *fx.backend.fail_upload.lock() = Some("File is not a zip file".to_string());
    let dashboard = fx.dashboard();
    dashboard.set_source(0, local_file()).await.unwrap();

    let outcome = dashboard.reingest().await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(dashboard.aggregate().is_none());
    assert_eq!(dashboard.view_mode(), ViewMode::Upload);
    assert!(dashboard
        .last_error()
        .unwrap()
        .contains("File is not a zip file"));
    assert!(fx.backend.fetched.lock().is_empty());
    assert!(fx
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::RunFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_response_after_clear_all_is_discarded() {
    let fx = Fixture::new();
    *fx.backend.fetch_delay.lock() = Duration::from_secs(2);
    let dashboard = Arc::new(fx.dashboard());

    let in_flight = tokio::spawn({
        let dashboard = dashboard.clone();
        async move { dashboard.refresh_query().await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    dashboard.clear_all();

    assert_eq!(in_flight.await.unwrap(), RunOutcome::Discarded);
    assert!(dashboard.aggregate().is_none());
    dashboard.with_filters(|f| assert!(f.is_cleared()));
    assert!(fx
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::StaleResponseDiscarded { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_full_run_outlived_by_source_removal_keeps_upload_view() {
    let fx = Fixture::new();
    *fx.backend.fetch_delay.lock() = Duration::from_secs(2);
    let dashboard = Arc::new(fx.dashboard());
    dashboard.set_source(0, local_file()).await.unwrap();

    let in_flight = tokio::spawn({
        let dashboard = dashboard.clone();
        async move { dashboard.reingest().await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(dashboard.clear_source(0).await.unwrap());

    assert_eq!(in_flight.await.unwrap(), RunOutcome::Discarded);
    assert_eq!(dashboard.view_mode(), ViewMode::Upload);
    assert!(dashboard.aggregate().is_none());
    assert!(!fx.screen.modes.lock().contains(&ViewMode::Dashboard));

    let events = fx.events();
    assert!(events.contains(&SessionEvent::SourcesCleared));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::StaleResponseDiscarded { kind: RunKind::Full, .. })));
    assert!(!events.contains(&SessionEvent::ViewModeChanged {
        mode: ViewMode::Dashboard
    }));
}

#[tokio::test]
async fn test_removing_last_source_forgets_previous_error() {
    let fx = Fixture::new();
    *fx.backend.fail_upload.lock() = Some("File is not a zip file".to_string());
    let dashboard = fx.dashboard();
    dashboard.set_source(0, local_file()).await.unwrap();
    assert!(matches!(dashboard.reingest().await, RunOutcome::Failed(_)));
    assert!(dashboard.last_error().is_some());

    assert!(dashboard.clear_source(0).await.unwrap());

    assert_eq!(dashboard.last_error(), None);
    assert_eq!(dashboard.view_mode(), ViewMode::Upload);
}

#[tokio::test]
async fn test_query_uses_current_selection() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    dashboard.select("country", SelectionChange::set("NZ")).unwrap();

    assert_eq!(dashboard.refresh_query().await, RunOutcome::Succeeded);

    let fetched = fx.backend.fetched.lock().clone();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].get("Country"), Some("NZ"));
    assert_eq!(fetched[0].get("City"), None);
}

// ============================================================================
// Sources and persistence
// ============================================================================

#[tokio::test]
async fn test_sheet_dataset_names_are_persisted_and_dropped() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    dashboard
        .set_source(1, sheet("https://docs.google.com/spreadsheets/d/abc/edit"))
        .await
        .unwrap();

    assert_eq!(dashboard.reingest().await, RunOutcome::Succeeded);

    let stored: SourceSlots = load_json(fx.store.as_ref(), SOURCES_KEY).unwrap().unwrap();
    match stored.get(1) {
        Some(SourceDescriptor::ExternalSheet(s)) => {
            assert_eq!(s.dataset_name.as_deref(), Some("googlesheet2"))
        }
        other => panic!("unexpected slot: {other:?}"),
    }

    let emptied = dashboard.clear_source(1).await.unwrap();
    assert!(emptied);
    assert_eq!(*fx.backend.cleared.lock(), vec!["googlesheet2"]);
    assert!(dashboard.aggregate().is_none());
    assert_eq!(dashboard.view_mode(), ViewMode::Upload);
    assert!(fx.events().contains(&SessionEvent::SourcesCleared));
}

#[tokio::test]
async fn test_set_source_rejects_bad_index() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    let err = dashboard.set_source(9, local_file()).await.unwrap_err();
    assert!(matches!(err, DashboardError::Slot(_)));
}

#[test]
fn test_open_restores_layout_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let fx = Fixture::new();

    {
        let store = open_store(&path).unwrap();
        let mut slots = SourceSlots::with_len(2);
        slots.set(0, local_file()).unwrap();
        tallyboard_storage::save_json(&store, SOURCES_KEY, &slots).unwrap();
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(open_store(&path).unwrap());
    let dashboard = Dashboard::open(
        graph(),
        4,
        Collaborators::from_backend(fx.backend.clone(), fx.screen.clone()),
        store.clone(),
    );

    let slots = dashboard.slots();
    assert_eq!(slots.len(), 4);
    assert!(matches!(slots.get(0), Some(SourceDescriptor::LocalFile(_))));

    let filters: Vec<FilterDefinition> = load_json(store.as_ref(), FILTERS_KEY).unwrap().unwrap();
    assert_eq!(filters.len(), 2);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_select_and_refresh() {
    let fx = Fixture::new();
    let dashboard = fx.dashboard();
    dashboard.set_source(0, local_file()).await.unwrap();
    let session = DashboardSession::start(
        dashboard,
        Arc::new(SystemClock),
        RefreshConfig::default(),
    )
    .await;
    assert_eq!(fx.backend.published.lock().len(), 2);

    session.refresh_now();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.dashboard().view_mode(), ViewMode::Dashboard);
    assert!(session.status().last_timestamp.is_some());
    assert!(!session.busy());

    session
        .select("city", SelectionChange::set("Auckland"))
        .unwrap();
    let reset = session
        .select("country", SelectionChange::set("NZ"))
        .unwrap();
    assert_eq!(reset, vec!["city".to_string()]);
    assert_eq!(session.state(), SchedulerState::Pending);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let fetched = fx.backend.fetched.lock().clone();
    assert_eq!(fetched.len(), 2, "one full run, one debounced query");
    assert_eq!(fetched[1].get("Country"), Some("NZ"));
    assert_eq!(fetched[1].get("City"), None);

    session.clear_source(0).await.unwrap();
    assert_eq!(session.status().last_timestamp, None);
    session.shutdown();
}
