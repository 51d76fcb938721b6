//! Mutable per-filter options and selections, with cascading resets.

use crate::graph::{FilterDefinition, FilterGraph, FilterId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the user currently has selected in one filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    /// Single-select: `None` means nothing selected.
    Single(Option<String>),
    /// Multi-select, in the order values were picked. Never holds duplicates.
    Multi(Vec<String>),
}

impl Selection {
    fn empty_for(def: &FilterDefinition) -> Self {
        if def.is_multi_select {
            Selection::Multi(Vec::new())
        } else {
            Selection::Single(None)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Selection::Single(value) => value.is_none(),
            Selection::Multi(values) => values.is_empty(),
        }
    }

    fn clear(&mut self) {
        match self {
            Selection::Single(value) => *value = None,
            Selection::Multi(values) => values.clear(),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Selection::Single(value) => value.iter().map(String::as_str).collect(),
            Selection::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// A user edit to one filter's selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionChange {
    /// Single-select: replace the value. `None` or `""` clears it.
    Set(Option<String>),
    /// Multi-select: add the value if absent, remove it if present.
    Toggle(String),
    /// Multi-select: select every current option.
    SelectAll,
    /// Multi-select: clear the selection.
    DeselectAll,
}

impl SelectionChange {
    pub fn set(value: &str) -> Self {
        SelectionChange::Set(Some(value.to_string()))
    }

    fn requires_multi(&self) -> bool {
        !matches!(self, SelectionChange::Set(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown filter '{0}'")]
    UnknownFilter(FilterId),
    #[error("filter '{filter}' is {}; cannot apply {change:?}", mode_name(.multi))]
    ModeMismatch {
        filter: FilterId,
        multi: bool,
        change: SelectionChange,
    },
}

fn mode_name(multi: &bool) -> &'static str {
    if *multi {
        "multi-select"
    } else {
        "single-select"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub options: Vec<String>,
    pub selected: Selection,
}

/// Owns one [`FilterState`] per declared filter, in declaration order.
#[derive(Debug, Clone)]
pub struct FilterStateStore {
    graph: Arc<FilterGraph>,
    states: Vec<FilterState>,
}

impl FilterStateStore {
    pub fn new(graph: Arc<FilterGraph>) -> Self {
        let states = graph
            .iter()
            .map(|def| FilterState {
                options: Vec::new(),
                selected: Selection::empty_for(def),
            })
            .collect();
        Self { graph, states }
    }

    pub fn graph(&self) -> &Arc<FilterGraph> {
        &self.graph
    }

    pub fn state(&self, filter_id: &str) -> Option<&FilterState> {
        self.graph.position(filter_id).map(|pos| &self.states[pos])
    }

    /// Definitions paired with their state, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&FilterDefinition, &FilterState)> {
        self.graph.iter().zip(self.states.iter())
    }

    /// Apply a user edit, then reset every direct dependent of `filter_id`.
    ///
    /// Returns the ids of the dependents that were reset. Dependents of those
    /// dependents are left alone unless they also depend on `filter_id`.
    pub fn set_selection(
        &mut self,
        filter_id: &str,
        change: SelectionChange,
    ) -> Result<Vec<FilterId>, SelectionError> {
        let pos = self
            .graph
            .position(filter_id)
            .ok_or_else(|| SelectionError::UnknownFilter(filter_id.to_string()))?;
        let multi = self.graph.definitions()[pos].is_multi_select;
        if change.requires_multi() != multi {
            return Err(SelectionError::ModeMismatch {
                filter: filter_id.to_string(),
                multi,
                change,
            });
        }

        let state = &mut self.states[pos];
        match (&mut state.selected, change) {
            (Selection::Single(current), SelectionChange::Set(value)) => {
                *current = value.filter(|v| !v.is_empty());
            }
            (Selection::Multi(current), SelectionChange::Toggle(value)) => {
                if let Some(idx) = current.iter().position(|v| *v == value) {
                    current.remove(idx);
                } else {
                    current.push(value);
                }
            }
            (Selection::Multi(current), SelectionChange::SelectAll) => {
                current.clear();
                for option in &state.options {
                    if !current.contains(option) {
                        current.push(option.clone());
                    }
                }
            }
            (Selection::Multi(current), SelectionChange::DeselectAll) => current.clear(),
            // Selection shape always matches the definition's mode.
            _ => {}
        }

        let graph = Arc::clone(&self.graph);
        let mut reset = Vec::new();
        for &dep in graph.dependent_positions(pos) {
            self.states[dep].selected.clear();
            reset.push(graph.definitions()[dep].id.clone());
        }
        Ok(reset)
    }

    /// Overwrite the options of one filter. The selection is left as is.
    pub fn replace_options(
        &mut self,
        filter_id: &str,
        options: Vec<String>,
    ) -> Result<(), SelectionError> {
        let pos = self
            .graph
            .position(filter_id)
            .ok_or_else(|| SelectionError::UnknownFilter(filter_id.to_string()))?;
        self.states[pos].options = options;
        Ok(())
    }

    /// Overwrite every filter's options from a map keyed by source column.
    /// Filters whose column is absent get an empty list.
    pub fn apply_options(&mut self, by_column: &BTreeMap<String, Vec<String>>) {
        for (def, state) in self.graph.iter().zip(self.states.iter_mut()) {
            state.options = by_column
                .get(&def.source_column)
                .cloned()
                .unwrap_or_default();
        }
    }

    /// Empty every selection and every option list.
    pub fn clear_all(&mut self) {
        for state in &mut self.states {
            state.options.clear();
            state.selected.clear();
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.states
            .iter()
            .all(|s| s.options.is_empty() && s.selected.is_empty())
    }
}
