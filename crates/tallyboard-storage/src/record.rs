//! On-disk layout of the state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FORMAT_VERSION: u32 = 1;

/// One stored value plus when it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub saved_at: DateTime<Utc>,
    pub value: serde_json::Value,
}

/// The whole state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub records: BTreeMap<String, StoredRecord>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            records: BTreeMap::new(),
        }
    }
}
