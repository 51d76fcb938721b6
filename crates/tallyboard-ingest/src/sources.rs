//! Source descriptors and the fixed slot layout they live in.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A spreadsheet file picked from the local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub path: PathBuf,
    /// Worksheet to read; the backend reads the first few when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet_name: None,
        }
    }

    pub fn with_sheet(mut self, sheet: &str) -> Self {
        self.sheet_name = Some(sheet.to_string());
        self
    }
}

/// A range of a remotely hosted spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSheet {
    pub url: String,
    #[serde(default)]
    pub selected_range: Option<String>,
    /// Assigned by the backend once the sheet has been processed.
    #[serde(default)]
    pub dataset_name: Option<String>,
}

impl ExternalSheet {
    pub fn new(url: &str, range: &str) -> Self {
        Self {
            url: url.to_string(),
            selected_range: Some(range.to_string()),
            dataset_name: None,
        }
    }

    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// The selected range when it is present and not blank.
    pub fn range(&self) -> Option<&str> {
        self.selected_range
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Ready for the sheet-processing step: both a URL and a range.
    pub fn is_processable(&self) -> bool {
        self.has_url() && self.range().is_some()
    }

    /// The document id from a `/spreadsheets/d/<id>/...` URL.
    pub fn spreadsheet_id(&self) -> Option<String> {
        spreadsheet_id(&self.url)
    }
}

pub fn spreadsheet_id(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw.trim()).ok()?;
    let mut segments = parsed.path_segments()?;
    match (segments.next(), segments.next(), segments.next()) {
        (Some("spreadsheets"), Some("d"), Some(id)) if !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceDescriptor {
    LocalFile(LocalFile),
    ExternalSheet(ExternalSheet),
}

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("slot {index} is out of range (have {len} slots)")]
    OutOfRange { index: usize, len: usize },
}

/// Fixed-size, ordered sequence of source slots. Any slot may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceSlots {
    slots: Vec<Option<SourceDescriptor>>,
}

impl SourceSlots {
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    /// Resize a persisted layout to `len` slots, dropping trailing extras.
    pub fn resized(mut self, len: usize) -> Self {
        self.slots.resize(len, None);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SourceDescriptor> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Put `descriptor` in slot `index`, returning what was there.
    pub fn set(
        &mut self,
        index: usize,
        descriptor: Option<SourceDescriptor>,
    ) -> Result<Option<SourceDescriptor>, SlotError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange { index, len })?;
        Ok(std::mem::replace(slot, descriptor))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &SourceDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|d| (i, d)))
    }

    /// Populated local files, in slot order.
    pub fn local_files(&self) -> Vec<LocalFile> {
        self.iter()
            .filter_map(|(_, d)| match d {
                SourceDescriptor::LocalFile(f) => Some(f.clone()),
                SourceDescriptor::ExternalSheet(_) => None,
            })
            .collect()
    }

    pub fn sheets(&self) -> impl Iterator<Item = (usize, &ExternalSheet)> {
        self.iter().filter_map(|(i, d)| match d {
            SourceDescriptor::ExternalSheet(s) => Some((i, s)),
            SourceDescriptor::LocalFile(_) => None,
        })
    }

    pub(crate) fn sheet_mut(&mut self, index: usize) -> Option<&mut ExternalSheet> {
        match self.slots.get_mut(index)? {
            Some(SourceDescriptor::ExternalSheet(sheet)) => Some(sheet),
            _ => None,
        }
    }

    /// At least one local file, or one external sheet with a URL.
    pub fn has_work(&self) -> bool {
        self.iter().any(|(_, d)| match d {
            SourceDescriptor::LocalFile(_) => true,
            SourceDescriptor::ExternalSheet(s) => s.has_url(),
        })
    }

    /// Copy dataset names from `processed` into sheets that still point at
    /// the same URL. Slots edited in the meantime are left alone.
    pub fn merge_dataset_names(&mut self, processed: &SourceSlots) {
        for (index, sheet) in processed.sheets() {
            if let Some(live) = self.sheet_mut(index) {
                if live.url == sheet.url && sheet.dataset_name.is_some() {
                    live.dataset_name = sheet.dataset_name.clone();
                }
            }
        }
    }
}
