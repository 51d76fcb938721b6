//! Tests for the JSON state file

use super::*;
use serde_json::json;
use tempfile::tempdir;

/// Helper to create a store in a fresh directory
fn test_store() -> (JsonFileStore, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = JsonFileStore::new(StorageConfig {
        path: dir.path().join("state").join("tallyboard.json"),
        pretty: false,
    })
    .unwrap();
    (store, dir)
}

#[test]
fn test_missing_file_starts_empty() {
    let (store, _dir) = test_store();
    assert!(store.get("sources").unwrap().is_none());
    assert!(!store.path().exists(), "nothing written until first put");
}

#[test]
fn test_values_survive_reopen() {
    let (store, _dir) = test_store();
    store.put("sources", json!([null, {"url": "x"}])).unwrap();
    store.put("filters", json!([{"id": "year"}])).unwrap();

    let reopened = JsonFileStore::new(StorageConfig {
        path: store.path().to_path_buf(),
        pretty: true,
    })
    .unwrap();
    assert_eq!(
        reopened.get("sources").unwrap(),
        Some(json!([null, {"url": "x"}]))
    );
    assert_eq!(reopened.saved_at().len(), 2);
}

#[test]
fn test_remove_rewrites_file() {
    let (store, _dir) = test_store();
    store.put("a", json!(1)).unwrap();
    assert!(store.remove("a").unwrap());
    assert!(!store.remove("a").unwrap());

    let contents = std::fs::read_to_string(store.path()).unwrap();
    assert!(!contents.contains("\"a\""));
}

#[test]
fn test_rejects_unknown_format_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"version": 99, "records": {}}"#).unwrap();
    let err = open_store(&path).err().expect("version mismatch must fail");
    assert!(err.to_string().contains("format version 99"));
}

#[test]
fn test_typed_helpers() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Slot {
        url: String,
    }

    let store = MemoryStore::new();
    save_json(&store, "slots", &vec![Slot { url: "u".into() }]).unwrap();
    let back: Option<Vec<Slot>> = load_json(&store, "slots").unwrap();
    assert_eq!(back, Some(vec![Slot { url: "u".into() }]));

    store.put("slots", json!("not a list")).unwrap();
    let err = load_json::<Vec<Slot>>(&store, "slots").unwrap_err();
    assert!(err.to_string().contains("unexpected shape"));

    let missing: Option<Vec<Slot>> = load_json(&store, "absent").unwrap();
    assert!(missing.is_none());
    assert_eq!(store.keys(), vec!["slots".to_string()]);
}
