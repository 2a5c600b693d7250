use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Dropdown,
    Slider,
    Toggle,
    Checkbox,
    Map,
    Fixed,
}

/// One selectable value of a filter.
///
/// `is_valid` and `is_hidden` are only present once validity has been
/// computed, and `is_valid` is cleared again for filters that do not ask for
/// validation so consumers render no indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOption {
    pub display_value: String,
    pub param_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

impl FilterOption {
    pub fn new(display_value: impl Into<String>, param_value: Value) -> Self {
        Self {
            display_value: display_value.into(),
            param_value,
            is_valid: None,
            is_hidden: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum FilterValues {
    Local {
        #[serde(default)]
        values: Vec<FilterOption>,
    },
    #[serde(rename_all = "camelCase")]
    MetadataTable {
        metadata_table_name: String,
        display_column: String,
        param_column: String,
        #[serde(default)]
        values: Vec<FilterOption>,
    },
}

impl FilterValues {
    pub fn options(&self) -> &[FilterOption] {
        match self {
            FilterValues::Local { values } | FilterValues::MetadataTable { values, .. } => values,
        }
    }

    pub fn options_mut(&mut self) -> &mut Vec<FilterOption> {
        match self {
            FilterValues::Local { values } | FilterValues::MetadataTable { values, .. } => values,
        }
    }
}

/// Filter action vocabulary carried in page configs.
///
/// Only parameterised-layer and query-param updates are applied by the
/// engine. The rest are handed to UI collaborators untouched.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterActionKind {
    UpdateQueryParams,
    UpdateParameterisedLayer,
    UpdateLegendText,
    SetSelectedFeatures,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterAction {
    pub action: FilterActionKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl FilterAction {
    pub fn new(action: FilterActionKind) -> Self {
        Self {
            action,
            payload: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Assigned at page load when empty; unique within a page.
    #[serde(default)]
    pub id: String,
    pub filter_name: String,
    pub param_name: String,
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub values: FilterValues,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default)]
    pub should_filter_others: bool,
    #[serde(default)]
    pub should_be_filtered: bool,
    #[serde(default)]
    pub should_be_validated: bool,
    #[serde(default)]
    pub should_filter_on_validation: bool,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default)]
    pub actions: Vec<FilterAction>,
}

impl FilterConfig {
    pub fn new(
        filter_name: impl Into<String>,
        param_name: impl Into<String>,
        filter_type: FilterType,
        values: FilterValues,
    ) -> Self {
        Self {
            id: String::new(),
            filter_name: filter_name.into(),
            param_name: param_name.into(),
            filter_type,
            values,
            multi_select: false,
            should_filter_others: false,
            should_be_filtered: false,
            should_be_validated: false,
            should_filter_on_validation: false,
            default_value: Value::Null,
            actions: Vec::new(),
        }
    }

    pub fn options(&self) -> &[FilterOption] {
        self.values.options()
    }

    /// `(table name, param column)` for metadata-sourced filters.
    pub fn metadata_source(&self) -> Option<(&str, &str)> {
        match &self.values {
            FilterValues::MetadataTable {
                metadata_table_name,
                param_column,
                ..
            } => Some((metadata_table_name, param_column)),
            FilterValues::Local { .. } => None,
        }
    }

    pub fn has_action(&self, kind: FilterActionKind) -> bool {
        self.actions.iter().any(|a| a.action == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserialises_metadata_sourced_filter() {
        let filter: FilterConfig = serde_json::from_value(json!({
            "filterName": "Scenario 1 year",
            "paramName": "year",
            "type": "dropdown",
            "values": {
                "source": "metadataTable",
                "metadataTableName": "scenarios",
                "displayColumn": "year_label",
                "paramColumn": "year"
            },
            "shouldBeFiltered": true,
            "actions": [
                { "action": "UPDATE_QUERY_PARAMS" },
                { "action": "UPDATE_PARAMETERISED_LAYER", "payload": { "layerName": "zones" } },
                { "action": "SOMETHING_NEW" }
            ]
        }))
        .unwrap();

        assert_eq!(filter.id, "");
        assert_eq!(filter.metadata_source(), Some(("scenarios", "year")));
        assert!(filter.options().is_empty());
        assert_eq!(filter.actions[1].payload_str("layerName"), Some("zones"));
        assert_eq!(filter.actions[2].action, FilterActionKind::Other);
        assert!(filter.has_action(FilterActionKind::UpdateQueryParams));
    }

    #[test]
    fn option_flags_are_omitted_until_computed() {
        let option = FilterOption::new("Bus", json!("bus"));
        assert_eq!(
            serde_json::to_value(&option).unwrap(),
            json!({ "displayValue": "Bus", "paramValue": "bus" })
        );
    }
}
