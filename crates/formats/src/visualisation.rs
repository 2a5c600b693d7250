use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rows::{Row, is_empty_selection, param_string};
use crate::style::Style;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualisationType {
    JoinDataToMap,
    CalloutCard,
    Geojson,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationMethod {
    #[default]
    Jenks,
    StandardDeviation,
    HeadTail,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub required: bool,
}

impl QueryParam {
    pub fn required() -> Self {
        Self {
            value: Value::Null,
            required: true,
        }
    }

    pub fn optional(value: Value) -> Self {
        Self {
            value,
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualisationConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub vis_type: VisualisationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
    pub data_path: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, QueryParam>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_value_field")]
    pub value_field: String,
    #[serde(default)]
    pub dynamic_style: bool,
    #[serde(default)]
    pub classification: ClassificationMethod,
    #[serde(default)]
    pub filter_to_viewport: bool,
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breaks: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_data: Option<Vec<Row>>,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_value_field() -> String {
    "value".to_string()
}

impl VisualisationConfig {
    pub fn new(
        name: impl Into<String>,
        vis_type: VisualisationType,
        data_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vis_type,
            join_layer: None,
            style: None,
            data_path: data_path.into(),
            query_params: BTreeMap::new(),
            method: HttpMethod::Get,
            id_field: default_id_field(),
            value_field: default_value_field(),
            dynamic_style: false,
            classification: ClassificationMethod::Jenks,
            filter_to_viewport: false,
            data: Vec::new(),
            breaks: Vec::new(),
            visible_data: None,
        }
    }

    /// Names of `required` params with nothing selected (null, `""` or `[]`).
    pub fn missing_required_params(&self) -> Vec<&str> {
        self.query_params
            .iter()
            .filter(|(_, p)| p.required && is_empty_selection(&p.value))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn is_ready_to_fetch(&self) -> bool {
        self.missing_required_params().is_empty()
    }

    /// Query pairs for a fetch, skipping params without a value.
    pub fn request_params(&self) -> Vec<(String, String)> {
        self.query_params
            .iter()
            .filter_map(|(name, p)| param_string(&p.value).map(|v| (name.clone(), v)))
            .collect()
    }

    pub fn joins_map(&self) -> bool {
        self.vis_type == VisualisationType::JoinDataToMap && self.join_layer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn deserialises_wire_shape_with_defaults() {
        let vis: VisualisationConfig = serde_json::from_value(json!({
            "name": "trips",
            "type": "joinDataToMap",
            "joinLayer": "zones",
            "style": "polygon-continuous",
            "dataPath": "/api/trips",
            "queryParams": {
                "year": { "value": 2024, "required": true },
                "mode": { "value": null }
            }
        }))
        .unwrap();

        assert_eq!(vis.vis_type, VisualisationType::JoinDataToMap);
        assert_eq!(vis.id_field, "id");
        assert_eq!(vis.value_field, "value");
        assert_eq!(vis.classification, ClassificationMethod::Jenks);
        assert_eq!(vis.method, HttpMethod::Get);
        assert!(vis.joins_map());
        assert_eq!(vis.request_params(), vec![("year".to_string(), "2024".to_string())]);
    }

    #[test]
    fn required_nulls_block_fetching() {
        let mut vis = VisualisationConfig::new("card", VisualisationType::CalloutCard, "/api/card");
        vis.query_params.insert("zone".to_string(), QueryParam::required());
        vis.query_params
            .insert("mode".to_string(), QueryParam::optional(Value::Null));
        assert_eq!(vis.missing_required_params(), vec!["zone"]);
        assert!(!vis.is_ready_to_fetch());

        vis.query_params.get_mut("zone").unwrap().value = json!(["a", "b"]);
        assert!(vis.is_ready_to_fetch());
        assert_eq!(vis.request_params(), vec![("zone".to_string(), "a,b".to_string())]);
    }

    #[test]
    fn cleared_required_selection_blocks_fetching() {
        let mut vis = VisualisationConfig::new("card", VisualisationType::CalloutCard, "/api/card");
        vis.query_params.insert(
            "mode".to_string(),
            QueryParam { value: json!(["bus"]), required: true },
        );
        assert!(vis.is_ready_to_fetch());

        for cleared in [json!([]), json!(""), json!([null])] {
            vis.query_params.get_mut("mode").unwrap().value = cleared;
            assert_eq!(vis.missing_required_params(), vec!["mode"]);
        }
    }
}
