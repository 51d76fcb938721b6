//! Filter state → flat query parameters for the aggregate fetch.

use crate::state::{FilterStateStore, Selection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters keyed by source column. Keys iterate in sorted order so the
/// same filter state always serializes the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParameters(BTreeMap<String, String>);

impl QueryParameters {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `(column, value)` pairs ready for URL query encoding.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Only non-empty selections contribute. Single-select values go through
/// verbatim; multi-select values become a JSON array of strings in the
/// order they were picked.
pub fn build_parameters(store: &FilterStateStore) -> QueryParameters {
    let mut params = BTreeMap::new();
    for (def, state) in store.iter() {
        let value = match &state.selected {
            Selection::Single(Some(value)) => value.clone(),
            Selection::Multi(values) if !values.is_empty() => encode_list(values),
            _ => continue,
        };
        params.insert(def.source_column.clone(), value);
    }
    QueryParameters(params)
}

fn encode_list(values: &[String]) -> String {
    serde_json::Value::Array(
        values
            .iter()
            .cloned()
            .map(serde_json::Value::String)
            .collect(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{FilterDefinition, FilterGraph};
    use crate::state::SelectionChange;
    use std::sync::Arc;

    fn store() -> FilterStateStore {
        let graph = FilterGraph::new(vec![
            FilterDefinition::top_level("year", "Year"),
            FilterDefinition::dependent("month", "Month", &["year"]).multi_select(),
            FilterDefinition::top_level("sector", "sector"),
        ])
        .unwrap();
        FilterStateStore::new(Arc::new(graph))
    }

    #[test]
    fn empty_selection_contributes_nothing() {
        let store = store();
        assert!(build_parameters(&store).is_empty());
    }

    #[test]
    fn single_verbatim_and_multi_as_json_list() {
        let mut store = store();
        store
            .set_selection("year", SelectionChange::set("2024"))
            .unwrap();
        for m in ["Mar", "Jan", "Say \"hi\""] {
            store
                .set_selection("month", SelectionChange::Toggle(m.to_string()))
                .unwrap();
        }

        let params = build_parameters(&store);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("Year"), Some("2024"));
        assert_eq!(params.get("Month"), Some(r#"["Mar","Jan","Say \"hi\""]"#));
        assert_eq!(params.get("sector"), None);

        let decoded: Vec<String> = serde_json::from_str(params.get("Month").unwrap()).unwrap();
        assert_eq!(decoded, vec!["Mar", "Jan", "Say \"hi\""]);
    }

    #[test]
    fn identical_state_gives_identical_parameters() {
        let mut a = store();
        let mut b = store();
        for s in [&mut a, &mut b] {
            s.set_selection("sector", SelectionChange::set("Energy"))
                .unwrap();
            s.set_selection("year", SelectionChange::set("2023"))
                .unwrap();
        }
        assert_eq!(build_parameters(&a), build_parameters(&b));
        assert_eq!(
            build_parameters(&a).to_query_pairs(),
            vec![
                ("Year".to_string(), "2023".to_string()),
                ("sector".to_string(), "Energy".to_string()),
            ]
        );
    }
}
