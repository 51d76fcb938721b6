//! Static filter declarations and their dependency edges.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifier of a declared filter (e.g. `"category"`).
pub type FilterId = String;

/// Whether a filter stands on its own or narrows another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterKind {
    TopLevel,
    Dependent,
}

/// One filter as declared in the dashboard configuration.
///
/// Field names follow the JSON shape the backend accepts for its filter
/// config (`column`, `type`, `dependsOn`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    pub id: FilterId,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "column", alias = "sourceColumn")]
    pub source_column: String,
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(
        rename = "dependsOn",
        alias = "depends_on",
        default,
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub depends_on: BTreeSet<FilterId>,
    #[serde(rename = "isMultiSelect", default)]
    pub is_multi_select: bool,
}

impl FilterDefinition {
    pub fn top_level(id: &str, column: &str) -> Self {
        Self {
            id: id.to_string(),
            label: column.to_string(),
            source_column: column.to_string(),
            kind: FilterKind::TopLevel,
            depends_on: BTreeSet::new(),
            is_multi_select: false,
        }
    }

    pub fn dependent(id: &str, column: &str, depends_on: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            label: column.to_string(),
            source_column: column.to_string(),
            kind: FilterKind::Dependent,
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            is_multi_select: false,
        }
    }

    pub fn multi_select(mut self) -> Self {
        self.is_multi_select = true;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Label shown next to the control; falls back to the column name.
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.source_column
        } else {
            &self.label
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("filter '{0}' is declared more than once")]
    DuplicateId(FilterId),
    #[error("top-level filter '{0}' must not declare dependencies")]
    TopLevelWithDependencies(FilterId),
    #[error("dependent filter '{0}' declares no dependencies")]
    DependentWithoutDependencies(FilterId),
    #[error("filter '{filter}' depends on undeclared filter '{missing}'")]
    UndeclaredDependency { filter: FilterId, missing: FilterId },
    #[error("filter dependencies form a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<FilterId>),
    #[error("invalid filter config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Validated, immutable set of filter declarations.
#[derive(Debug, Clone)]
pub struct FilterGraph {
    definitions: Vec<FilterDefinition>,
    index: HashMap<FilterId, usize>,
    /// `dependents[i]` holds positions of filters that list `definitions[i]`
    /// in their `depends_on`, ascending (declaration order).
    dependents: Vec<Vec<usize>>,
}

impl FilterGraph {
    pub fn new(definitions: Vec<FilterDefinition>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (pos, def) in definitions.iter().enumerate() {
            if index.insert(def.id.clone(), pos).is_some() {
                return Err(ConfigError::DuplicateId(def.id.clone()));
            }
        }

        let mut dependents = vec![Vec::new(); definitions.len()];
        for (pos, def) in definitions.iter().enumerate() {
            match (def.kind, def.depends_on.is_empty()) {
                (FilterKind::TopLevel, false) => {
                    return Err(ConfigError::TopLevelWithDependencies(def.id.clone()))
                }
                (FilterKind::Dependent, true) => {
                    return Err(ConfigError::DependentWithoutDependencies(def.id.clone()))
                }
                _ => {}
            }
            for dep in &def.depends_on {
                let Some(&dep_pos) = index.get(dep) else {
                    return Err(ConfigError::UndeclaredDependency {
                        filter: def.id.clone(),
                        missing: dep.clone(),
                    });
                };
                dependents[dep_pos].push(pos);
            }
        }

        let graph = Self {
            definitions,
            index,
            dependents,
        };
        if let Some(cycle) = graph.find_cycle() {
            return Err(ConfigError::Cycle(cycle));
        }
        Ok(graph)
    }

    /// Parse and validate a JSON array of filter definitions.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let definitions: Vec<FilterDefinition> = serde_json::from_str(text)?;
        Self::new(definitions)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(&self.definitions)?)
    }

    pub fn get(&self, id: &str) -> Option<&FilterDefinition> {
        self.index.get(id).map(|&pos| &self.definitions[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn definitions(&self) -> &[FilterDefinition] {
        &self.definitions
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Filters whose `depends_on` includes `id`, in declaration order.
    /// Unknown ids have no dependents.
    pub fn dependents(&self, id: &str) -> impl Iterator<Item = &FilterDefinition> {
        self.index
            .get(id)
            .map(|&pos| self.dependents[pos].as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&pos| &self.definitions[pos])
    }

    pub(crate) fn dependent_positions(&self, pos: usize) -> &[usize] {
        &self.dependents[pos]
    }

    /// Depth-first search over dependency edges (filter -> what it depends on).
    fn find_cycle(&self) -> Option<Vec<FilterId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &FilterGraph,
            pos: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<FilterId>> {
            marks[pos] = Mark::InProgress;
            stack.push(pos);
            for dep in &graph.definitions[pos].depends_on {
                let dep_pos = graph.index[dep];
                match marks[dep_pos] {
                    Mark::InProgress => {
                        let start = stack.iter().position(|&p| p == dep_pos).unwrap_or(0);
                        let mut cycle: Vec<FilterId> = stack[start..]
                            .iter()
                            .map(|&p| graph.definitions[p].id.clone())
                            .collect();
                        cycle.push(graph.definitions[dep_pos].id.clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        if let Some(cycle) = visit(graph, dep_pos, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
            stack.pop();
            marks[pos] = Mark::Done;
            None
        }

        let mut marks = vec![Mark::Unvisited; self.definitions.len()];
        let mut stack = Vec::new();
        for pos in 0..self.definitions.len() {
            if marks[pos] == Mark::Unvisited {
                if let Some(cycle) = visit(self, pos, &mut marks, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}
