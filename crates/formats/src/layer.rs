use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Geojson,
    Tile,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryType {
    Polygon,
    Line,
    Point,
}

impl GeometryType {
    /// Paint property prefix used by the renderer for this geometry.
    pub fn paint_prefix(self) -> &'static str {
        match self {
            GeometryType::Polygon => "fill",
            GeometryType::Line => "line",
            GeometryType::Point => "circle",
        }
    }
}

/// A named map source plus how it renders.
///
/// `path` may hold `{param}` tokens. Once a token is substituted the original
/// text is kept in `path_template` and the substituted values in
/// `path_params`, so later substitutions start again from the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub geometry_type: GeometryType,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_template: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default = "default_true")]
    pub is_stylable: bool,
    #[serde(default)]
    pub is_hoverable: bool,
    #[serde(default)]
    pub preserve_base_style: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl LayerConfig {
    pub fn new(
        name: impl Into<String>,
        layer_type: LayerType,
        geometry_type: GeometryType,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            layer_type,
            geometry_type,
            path: path.into(),
            path_template: None,
            path_params: BTreeMap::new(),
            source_layer: None,
            is_stylable: true,
            is_hoverable: false,
            preserve_base_style: false,
            buffer_size: None,
            metadata: Map::new(),
        }
    }

    /// The path as originally configured, tokens intact.
    pub fn template(&self) -> &str {
        self.path_template.as_deref().unwrap_or(&self.path)
    }
}
