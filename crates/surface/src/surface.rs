use formats::{GeometryType, LayerConfig, LayerType};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::paint::PaintSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    UnknownSource(String),
    UnknownLayer(String),
    DuplicateSource(String),
    DuplicateLayer(String),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::UnknownSource(id) => write!(f, "unknown source {id}"),
            SurfaceError::UnknownLayer(id) => write!(f, "unknown layer {id}"),
            SurfaceError::DuplicateSource(id) => write!(f, "source {id} already exists"),
            SurfaceError::DuplicateLayer(id) => write!(f, "layer {id} already exists"),
        }
    }
}

impl std::error::Error for SurfaceError {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSpec {
    pub kind: LayerType,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,
}

impl SourceSpec {
    pub fn from_layer(layer: &LayerConfig) -> Self {
        Self {
            kind: layer.layer_type,
            url: layer.path.clone(),
            buffer_size: layer.buffer_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    pub geometry: GeometryType,
    pub paint: PaintSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl LayerSpec {
    /// One surface layer per configured layer, backed by a source of the same name.
    pub fn from_layer(layer: &LayerConfig) -> Self {
        Self {
            id: layer.name.clone(),
            source: layer.name.clone(),
            source_layer: layer.source_layer.clone(),
            geometry: layer.geometry_type,
            paint: PaintSpec::new(),
            filter: None,
        }
    }
}

/// Addresses one feature's state on the surface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FeatureKey {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    pub id: u64,
}

impl FeatureKey {
    pub fn new(source: impl Into<String>, source_layer: Option<String>, id: u64) -> Self {
        Self {
            source: source.into(),
            source_layer,
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceFeature {
    pub id: Option<u64>,
    pub source: String,
    pub properties: Map<String, Value>,
}

/// The map renderer as seen by the engine.
///
/// Mirrors the primitive calls a web map exposes. Implementations own all
/// rendering state; the engine only pushes sources, layers, paint and
/// per-feature state through here.
pub trait RenderSurface {
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), SurfaceError>;
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn get_source(&self, id: &str) -> Option<&SourceSpec>;

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn get_layer(&self, id: &str) -> Option<&LayerSpec>;

    fn set_paint_property(
        &mut self,
        layer: &str,
        property: &str,
        value: Value,
    ) -> Result<(), SurfaceError>;
    fn set_filter(&mut self, layer: &str, filter: Option<Value>) -> Result<(), SurfaceError>;

    fn set_feature_state(
        &mut self,
        key: &FeatureKey,
        state: Map<String, Value>,
    ) -> Result<(), SurfaceError>;
    fn remove_feature_state(&mut self, key: &FeatureKey) -> Result<(), SurfaceError>;

    fn query_source_features(&self, source: &str, source_layer: Option<&str>) -> Vec<SurfaceFeature>;
    fn query_rendered_features(&self, layer: &str) -> Vec<SurfaceFeature>;
}
