//! REST client for the dataset backend.
//!
//! Every endpoint answers with a `{"success": bool, "error"?: string, ...}`
//! envelope; anything other than `success: true` becomes
//! [`Outcome::Failure`].

use crate::collaborators::{
    AggregateResult, AuthToken, CatalogCollaborator, FetchCollaborator, Outcome,
    SheetCollaborator, SheetProcessed, SheetRequest, UploadCollaborator,
};
use crate::sources::LocalFile;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tallyboard_filters::{FilterDefinition, QueryParameters};
use url::Url;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Talks to the backend over HTTP; implements every remote collaborator.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    /// Source columns of the declared filters, used to pick options out of
    /// aggregate responses.
    columns: Vec<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, columns: Vec<String>) -> anyhow::Result<Self> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            base,
            columns,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base.join(path).map_err(|e| e.to_string())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Map<String, Value>, String> {
        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| e.to_string())?;
        let envelope: Envelope = response.json().await.map_err(|e| e.to_string())?;
        if envelope.success {
            Ok(envelope.rest)
        } else {
            Err(envelope
                .error
                .unwrap_or_else(|| "backend reported failure".to_string()))
        }
    }
}

fn outcome<T>(result: Result<T, String>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::Success(value),
        Err(reason) => Outcome::Failure { reason },
    }
}

/// Collect filter options from an aggregate payload.
///
/// The backend reports options as `<lowercased column>_options` arrays,
/// possibly nested inside per-dataset sections. Values from several sections
/// are merged in first-seen order.
pub fn extract_options(payload: &Value, columns: &[String]) -> BTreeMap<String, Vec<String>> {
    fn walk(value: &Value, key_to_column: &BTreeMap<String, &str>, out: &mut BTreeMap<String, Vec<String>>) {
        let Value::Object(map) = value else {
            return;
        };
        for (key, child) in map {
            if let (Some(column), Value::Array(items)) = (key_to_column.get(key), child) {
                let entry = out.entry(column.to_string()).or_default();
                for item in items {
                    let text = match item {
                        Value::String(s) => s.clone(),
                        Value::Null => continue,
                        other => other.to_string(),
                    };
                    if !entry.contains(&text) {
                        entry.push(text);
                    }
                }
            } else {
                walk(child, key_to_column, out);
            }
        }
    }

    let key_to_column: BTreeMap<String, &str> = columns
        .iter()
        .map(|c| (format!("{}_options", c.to_lowercase()), c.as_str()))
        .collect();
    let mut out = BTreeMap::new();
    walk(payload, &key_to_column, &mut out);
    out
}

#[async_trait]
impl UploadCollaborator for HttpBackend {
    async fn upload_files(&self, files: &[LocalFile]) -> Outcome<()> {
        let url = match self.endpoint("upload-files/") {
            Ok(url) => url,
            Err(reason) => return Outcome::Failure { reason },
        };

        let mut form = Form::new();
        for file in files {
            let bytes = match tokio::fs::read(&file.path).await {
                Ok(bytes) => bytes,
                Err(e) => return Outcome::failure(format!("{}: {e}", file.path.display())),
            };
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.xlsx".to_string());
            form = form
                .part("files", Part::bytes(bytes).file_name(name))
                .text("sheet_names", file.sheet_name.clone().unwrap_or_default());
        }

        outcome(
            self.send(self.client.post(url).multipart(form))
                .await
                .map(|_| ()),
        )
    }
}

#[async_trait]
impl SheetCollaborator for HttpBackend {
    async fn process_external_sheet(&self, request: SheetRequest<'_>) -> Outcome<SheetProcessed> {
        let url = match self.endpoint("process-google-sheet/") {
            Ok(url) => url,
            Err(reason) => return Outcome::Failure { reason },
        };
        // The backend numbers sheets from 1.
        let sheet_index = (request.slot_index + 1).to_string();
        let fields = [
            ("sheet_url", request.url),
            ("auth_token", request.auth_token.expose()),
            ("sheet_name", request.selected_range),
            ("sheet_index", sheet_index.as_str()),
        ];
        outcome(
            self.send(self.client.post(url).form(&fields))
                .await
                .map(|rest| SheetProcessed {
                    dataset_name: rest
                        .get("dataset_name")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                }),
        )
    }
}

#[async_trait]
impl FetchCollaborator for HttpBackend {
    async fn fetch_aggregate(&self, params: &QueryParameters) -> Outcome<AggregateResult> {
        let url = match self.endpoint("get-data/") {
            Ok(url) => url,
            Err(reason) => return Outcome::Failure { reason },
        };
        let pairs = params.to_query_pairs();
        outcome(
            self.send(self.client.get(url).query(&pairs))
                .await
                .map(|rest| {
                    let rows = Value::Object(rest);
                    let options = extract_options(&rows, &self.columns);
                    AggregateResult { rows, options }
                }),
        )
    }
}

#[async_trait]
impl CatalogCollaborator for HttpBackend {
    async fn publish_filter_config(&self, filters: &[FilterDefinition]) -> Outcome<()> {
        let url = match self.endpoint("set-filter-config/") {
            Ok(url) => url,
            Err(reason) => return Outcome::Failure { reason },
        };
        let config = match serde_json::to_string(filters) {
            Ok(config) => config,
            Err(e) => return Outcome::failure(e.to_string()),
        };
        let body = serde_json::json!({ "filterConfig": config });
        outcome(
            self.send(self.client.post(url).json(&body))
                .await
                .map(|_| ()),
        )
    }

    async fn clear_dataset(&self, dataset_name: &str) -> Outcome<()> {
        let url = match self.endpoint("clear-dataset/") {
            Ok(url) => url,
            Err(reason) => return Outcome::Failure { reason },
        };
        outcome(
            self.send(self.client.post(url).form(&[("dataset_name", dataset_name)]))
                .await
                .map(|_| ()),
        )
    }

    async fn sheet_names(&self, url: &str, auth_token: &AuthToken) -> Outcome<Vec<String>> {
        let endpoint = match self.endpoint("get-sheet-names/") {
            Ok(endpoint) => endpoint,
            Err(reason) => return Outcome::Failure { reason },
        };
        let fields = [("sheet_url", url), ("auth_token", auth_token.expose())];
        outcome(
            self.send(self.client.post(endpoint).form(&fields))
                .await
                .map(|rest| {
                    rest.get("sheet_names")
                        .and_then(Value::as_array)
                        .map(|names| {
                            names
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default()
                }),
        )
    }
}
