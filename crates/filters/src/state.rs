use std::collections::BTreeMap;

use formats::{FilterConfig, is_empty_selection, selection_keys};
use serde_json::Value;

use crate::options::default_selection;

/// Current selection per filter id: a scalar, or an array for multi-select.
pub type FilterState = BTreeMap<String, Value>;

/// Owner of the page's [`FilterState`].
///
/// Writes replace the previous selection wholesale; the page reducer only
/// ever reads from here.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilterStore {
    state: FilterState,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds defaults for filters that carry one.
    pub fn with_defaults(filters: &[FilterConfig]) -> Self {
        let mut store = Self::new();
        for filter in filters {
            let value = default_selection(filter);
            if !value.is_null() {
                store.set(&filter.id, value);
            }
        }
        store
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.state.get(id)
    }

    /// Returns the previous selection.
    pub fn set(&mut self, id: &str, value: Value) -> Option<Value> {
        self.state.insert(id.to_string(), value)
    }

    pub fn clear(&mut self, id: &str) -> Option<Value> {
        self.state.remove(id)
    }

    pub fn has_selection(&self, id: &str) -> bool {
        self.state.get(id).is_some_and(|v| !is_empty_selection(v))
    }

    /// Comparable keys of the selection, empty when nothing is selected.
    pub fn selection(&self, id: &str) -> Vec<String> {
        match self.state.get(id) {
            Some(v) if !is_empty_selection(v) => selection_keys(v),
            _ => Vec::new(),
        }
    }

    /// Value of the first filter driving `param_name` that has a selection.
    pub fn value_for_param(&self, filters: &[FilterConfig], param_name: &str) -> Option<Value> {
        filters
            .iter()
            .filter(|f| f.param_name == param_name)
            .find_map(|f| self.state.get(&f.id).filter(|v| !is_empty_selection(v)))
            .cloned()
    }
}
