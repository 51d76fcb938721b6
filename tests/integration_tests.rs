//! Integration tests for the complete Tallyboard flow
//!
//! These tests exercise several crates together:
//! - Config file → FilterGraph → FilterStateStore → QueryParameters
//! - Dashboard runs → JsonFileStore → reopened Dashboard
//! - DashboardSession timers → collaborators
//!
//! Run with: cargo test --test integration_tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use tallyboard_filters::{build_parameters, FilterStateStore, QueryParameters, SelectionChange};
use tallyboard_ingest::*;
use tallyboard_storage::{open_store, KeyValueStore};
use tallyboard_sync::*;

const CONFIG: &str = r#"{
    "filters": [
        {"id": "year", "label": "Year", "column": "Year", "type": "top-level"},
        {"id": "sector", "label": "Sector", "column": "Sector", "type": "top-level", "isMultiSelect": true},
        {"id": "company", "label": "Company", "column": "Company", "type": "dependent", "dependsOn": ["sector"], "isMultiSelect": true},
        {"id": "ticker", "label": "Ticker", "column": "Ticker", "type": "dependent", "dependsOn": ["company"]}
    ],
    "slotCount": 3,
    "refreshIntervalMinutes": 15
}"#;

// ============================================================================
// Backend stand-in
// ============================================================================

#[derive(Default)]
struct Backend {
    log: Mutex<Vec<String>>,
    fetched: Mutex<Vec<QueryParameters>>,
}

#[async_trait]
impl UploadCollaborator for Backend {
    async fn upload_files(&self, files: &[LocalFile]) -> Outcome<()> {
        self.log.lock().push(format!("upload:{}", files.len()));
        Outcome::Success(())
    }
}

#[async_trait]
impl SheetCollaborator for Backend {
    async fn process_external_sheet(&self, request: SheetRequest<'_>) -> Outcome<SheetProcessed> {
        self.log.lock().push(format!("sheet:{}", request.slot_index));
        Outcome::Success(SheetProcessed {
            dataset_name: Some(format!("googlesheet{}", request.slot_index + 1)),
        })
    }
}

#[async_trait]
impl FetchCollaborator for Backend {
    async fn fetch_aggregate(&self, params: &QueryParameters) -> Outcome<AggregateResult> {
        self.log.lock().push("fetch".to_string());
        self.fetched.lock().push(params.clone());
        let mut options = BTreeMap::new();
        options.insert("Year".to_string(), vec!["2023".to_string(), "2024".to_string()]);
        options.insert(
            "Sector".to_string(),
            vec!["Energy".to_string(), "Tech".to_string()],
        );
        Outcome::Success(AggregateResult {
            rows: serde_json::json!([]),
            options,
        })
    }
}

#[async_trait]
impl CatalogCollaborator for Backend {
    async fn publish_filter_config(&self, filters: &[tallyboard_filters::FilterDefinition]) -> Outcome<()> {
        self.log.lock().push(format!("publish:{}", filters.len()));
        Outcome::Success(())
    }

    async fn clear_dataset(&self, dataset_name: &str) -> Outcome<()> {
        self.log.lock().push(format!("clear:{dataset_name}"));
        Outcome::Success(())
    }

    async fn sheet_names(&self, _url: &str, _auth_token: &AuthToken) -> Outcome<Vec<String>> {
        Outcome::Success(Vec::new())
    }
}

struct NoScreen;

impl ViewModeSink for NoScreen {
    fn set_view_mode(&self, _mode: ViewMode) {}
}

fn open_dashboard(
    config: &DashboardConfig,
    backend: &Arc<Backend>,
    store: Arc<dyn KeyValueStore>,
) -> Dashboard {
    Dashboard::open(
        Arc::new(config.filter_graph().unwrap()),
        config.slot_count,
        Collaborators::from_backend(backend.clone(), Arc::new(NoScreen)),
        store,
    )
}

// ============================================================================
// Configuration → parameters
// ============================================================================

#[test]
fn test_config_file_to_parameters() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dashboard.json");
    std::fs::write(&path, CONFIG).unwrap();

    let config = DashboardConfig::load(&path).unwrap();
    assert_eq!(config.slot_count, 3);
    assert_eq!(config.refresh_config().unwrap().interval.minutes(), 15);

    let mut store = FilterStateStore::new(Arc::new(config.filter_graph().unwrap()));
    store.set_selection("year", SelectionChange::set("2024")).unwrap();
    store
        .set_selection("sector", SelectionChange::Toggle("Tech".into()))
        .unwrap();
    store
        .set_selection("company", SelectionChange::Toggle("Acme".into()))
        .unwrap();
    store.set_selection("ticker", SelectionChange::set("ACM")).unwrap();

    // Changing the sector resets company (direct dependent) but not ticker.
    let reset = store
        .set_selection("sector", SelectionChange::Toggle("Energy".into()))
        .unwrap();
    assert_eq!(reset, vec!["company".to_string()]);

    let params = build_parameters(&store);
    assert_eq!(params.get("Year"), Some("2024"));
    assert_eq!(params.get("Sector"), Some(r#"["Tech","Energy"]"#));
    assert_eq!(params.get("Company"), None);
    assert_eq!(params.get("Ticker"), Some("ACM"));
}

#[test]
fn test_config_file_errors_are_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        DashboardConfig::load(&missing),
        Err(SettingsError::Io { .. })
    ));

    let cyclic = dir.path().join("cyclic.json");
    std::fs::write(
        &cyclic,
        r#"{"filters": [
            {"id": "a", "column": "A", "type": "dependent", "dependsOn": ["b"]},
            {"id": "b", "column": "B", "type": "dependent", "dependsOn": ["a"]}
        ]}"#,
    )
    .unwrap();
    assert!(matches!(
        DashboardConfig::load(&cyclic),
        Err(SettingsError::Filters(_))
    ));
}

// ============================================================================
// Dashboard + file persistence
// ============================================================================

#[tokio::test]
async fn test_dataset_names_survive_restart() {
    let dir = tempdir().unwrap();
    let config = DashboardConfig {
        state_path: dir.path().join("state.json"),
        ..DashboardConfig::from_json(CONFIG).unwrap()
    };
    let backend = Arc::new(Backend::default());

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(open_store(&config.state_path).unwrap());
        let dashboard = open_dashboard(&config, &backend, store);
        dashboard
            .set_source(0, Some(SourceDescriptor::LocalFile(LocalFile::new("q1.xlsx"))))
            .await
            .unwrap();
        dashboard
            .set_source(
                2,
                Some(SourceDescriptor::ExternalSheet(ExternalSheet::new(
                    "https://docs.google.com/spreadsheets/d/xyz/edit",
                    "Prices",
                ))),
            )
            .await
            .unwrap();
        assert_eq!(dashboard.reingest().await, RunOutcome::Succeeded);
    }
    assert_eq!(
        *backend.log.lock(),
        vec!["upload:1", "sheet:2", "fetch"]
    );

    let store: Arc<dyn KeyValueStore> = Arc::new(open_store(&config.state_path).unwrap());
    let reopened = open_dashboard(&config, &backend, store);
    let slots = reopened.slots();
    let names: Vec<Option<&str>> = slots
        .sheets()
        .map(|(_, s)| s.dataset_name.as_deref())
        .collect();
    assert_eq!(names, vec![Some("googlesheet3")]);

    reopened.clear_source(2).await.unwrap();
    assert_eq!(backend.log.lock().last().unwrap(), "clear:googlesheet3");
}

// ============================================================================
// Session timers end to end
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_session_refreshes_periodically() {
    let config = DashboardConfig::from_json(CONFIG).unwrap();
    let backend = Arc::new(Backend::default());
    let dashboard = open_dashboard(&config, &backend, Arc::new(tallyboard_storage::MemoryStore::new()));
    dashboard
        .set_source(0, Some(SourceDescriptor::LocalFile(LocalFile::new("q1.xlsx"))))
        .await
        .unwrap();

    let session = DashboardSession::start(
        dashboard,
        Arc::new(SystemClock),
        config.refresh_config().unwrap(),
    )
    .await;
    let mut busy = session.subscribe_busy();

    // Nothing runs until the first 15 minute tick.
    tokio::time::sleep(Duration::from_secs(14 * 60)).await;
    assert!(backend.fetched.lock().is_empty());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(backend.fetched.lock().len(), 1);
    assert!(busy.has_changed().unwrap());
    assert!(!*busy.borrow_and_update());
    assert_eq!(session.dashboard().view_mode(), ViewMode::Dashboard);

    session
        .select("sector", SelectionChange::Toggle("Energy".into()))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let fetched = backend.fetched.lock().clone();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[1].get("Sector"), Some(r#"["Energy"]"#));

    assert!(session.set_interval(2).is_err());
    session.shutdown();
}
