use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::surface::{FeatureKey, LayerSpec, RenderSurface, SourceSpec, SurfaceError, SurfaceFeature};

/// Mutating surface calls, in the order they were made.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum SurfaceCall {
    AddSource { id: String },
    RemoveSource { id: String },
    AddLayer { id: String },
    RemoveLayer { id: String },
    SetPaintProperty { layer: String, property: String, value: Value },
    SetFilter { layer: String, filter: Option<Value> },
    SetFeatureState { key: FeatureKey, state: Map<String, Value> },
    RemoveFeatureState { key: FeatureKey },
}

/// In-memory [`RenderSurface`] that keeps state like a renderer would and
/// logs every mutation.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    sources: BTreeMap<String, SourceSpec>,
    layers: BTreeMap<String, LayerSpec>,
    feature_states: BTreeMap<FeatureKey, Map<String, Value>>,
    source_features: BTreeMap<String, Vec<SurfaceFeature>>,
    rendered_features: BTreeMap<String, Vec<SurfaceFeature>>,
    calls: Vec<SurfaceCall>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SurfaceCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.keys().map(String::as_str).collect()
    }

    pub fn feature_state(&self, key: &FeatureKey) -> Option<&Map<String, Value>> {
        self.feature_states.get(key)
    }

    /// Ids with feature state on `source`, ascending.
    pub fn feature_ids(&self, source: &str) -> Vec<u64> {
        self.feature_states
            .keys()
            .filter(|k| k.source == source)
            .map(|k| k.id)
            .collect()
    }

    /// Ids passed to `remove_feature_state` so far, in call order.
    pub fn removed_ids(&self) -> Vec<u64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SurfaceCall::RemoveFeatureState { key } => Some(key.id),
                _ => None,
            })
            .collect()
    }

    pub fn set_source_features(&mut self, source: &str, features: Vec<SurfaceFeature>) {
        self.source_features.insert(source.to_string(), features);
    }

    /// Features reported as on screen for `layer` until replaced.
    pub fn set_rendered_features(&mut self, layer: &str, features: Vec<SurfaceFeature>) {
        self.rendered_features.insert(layer.to_string(), features);
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, SurfaceError> {
        self.layers
            .get_mut(id)
            .ok_or_else(|| SurfaceError::UnknownLayer(id.to_string()))
    }
}

impl RenderSurface for RecordingSurface {
    fn add_source(&mut self, id: &str, spec: SourceSpec) -> Result<(), SurfaceError> {
        if self.sources.contains_key(id) {
            return Err(SurfaceError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), spec);
        self.calls.push(SurfaceCall::AddSource { id: id.to_string() });
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        if self.sources.remove(id).is_none() {
            return Err(SurfaceError::UnknownSource(id.to_string()));
        }
        self.feature_states.retain(|k, _| k.source != id);
        self.calls.push(SurfaceCall::RemoveSource { id: id.to_string() });
        Ok(())
    }

    fn get_source(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.get(id)
    }

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), SurfaceError> {
        if self.layers.contains_key(&spec.id) {
            return Err(SurfaceError::DuplicateLayer(spec.id));
        }
        if !self.sources.contains_key(&spec.source) {
            return Err(SurfaceError::UnknownSource(spec.source));
        }
        self.calls.push(SurfaceCall::AddLayer { id: spec.id.clone() });
        self.layers.insert(spec.id.clone(), spec);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        if self.layers.remove(id).is_none() {
            return Err(SurfaceError::UnknownLayer(id.to_string()));
        }
        self.calls.push(SurfaceCall::RemoveLayer { id: id.to_string() });
        Ok(())
    }

    fn get_layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.get(id)
    }

    fn set_paint_property(
        &mut self,
        layer: &str,
        property: &str,
        value: Value,
    ) -> Result<(), SurfaceError> {
        self.layer_mut(layer)?
            .paint
            .insert(property.to_string(), value.clone());
        self.calls.push(SurfaceCall::SetPaintProperty {
            layer: layer.to_string(),
            property: property.to_string(),
            value,
        });
        Ok(())
    }

    fn set_filter(&mut self, layer: &str, filter: Option<Value>) -> Result<(), SurfaceError> {
        self.layer_mut(layer)?.filter = filter.clone();
        self.calls.push(SurfaceCall::SetFilter {
            layer: layer.to_string(),
            filter,
        });
        Ok(())
    }

    fn set_feature_state(
        &mut self,
        key: &FeatureKey,
        state: Map<String, Value>,
    ) -> Result<(), SurfaceError> {
        if !self.sources.contains_key(&key.source) {
            return Err(SurfaceError::UnknownSource(key.source.clone()));
        }
        let entry = self.feature_states.entry(key.clone()).or_default();
        for (k, v) in &state {
            entry.insert(k.clone(), v.clone());
        }
        self.calls.push(SurfaceCall::SetFeatureState {
            key: key.clone(),
            state,
        });
        Ok(())
    }

    fn remove_feature_state(&mut self, key: &FeatureKey) -> Result<(), SurfaceError> {
        if !self.sources.contains_key(&key.source) {
            return Err(SurfaceError::UnknownSource(key.source.clone()));
        }
        self.feature_states.remove(key);
        self.calls
            .push(SurfaceCall::RemoveFeatureState { key: key.clone() });
        Ok(())
    }

    fn query_source_features(&self, source: &str, source_layer: Option<&str>) -> Vec<SurfaceFeature> {
        let Some(features) = self.source_features.get(source) else {
            return Vec::new();
        };
        let wanted = self.layers.values().any(|l| {
            l.source == source && (source_layer.is_none() || l.source_layer.as_deref() == source_layer)
        });
        if source_layer.is_some() && !wanted {
            return Vec::new();
        }
        features.clone()
    }

    fn query_rendered_features(&self, layer: &str) -> Vec<SurfaceFeature> {
        if !self.layers.contains_key(layer) {
            return Vec::new();
        }
        self.rendered_features.get(layer).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{GeometryType, LayerConfig, LayerType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn attach(surface: &mut RecordingSurface, name: &str) {
        let layer = LayerConfig::new(name, LayerType::Geojson, GeometryType::Polygon, "/zones.geojson");
        surface.add_source(name, SourceSpec::from_layer(&layer)).unwrap();
        surface.add_layer(LayerSpec::from_layer(&layer)).unwrap();
    }

    #[test]
    fn layers_need_their_source_and_unique_ids() {
        let mut surface = RecordingSurface::new();
        let layer = LayerConfig::new("zones", LayerType::Geojson, GeometryType::Polygon, "/z");
        assert_eq!(
            surface.add_layer(LayerSpec::from_layer(&layer)),
            Err(SurfaceError::UnknownSource("zones".into()))
        );
        attach(&mut surface, "zones");
        assert_eq!(
            surface.add_layer(LayerSpec::from_layer(&layer)),
            Err(SurfaceError::DuplicateLayer("zones".into()))
        );
        assert_eq!(surface.layer_ids(), vec!["zones"]);
    }

    #[test]
    fn feature_state_merges_and_dies_with_source() {
        let mut surface = RecordingSurface::new();
        attach(&mut surface, "zones");
        let key = FeatureKey::new("zones", None, 4);
        let mut state = Map::new();
        state.insert("value".into(), json!(1));
        surface.set_feature_state(&key, state).unwrap();
        let mut more = Map::new();
        more.insert("valueAbs".into(), json!(1));
        surface.set_feature_state(&key, more).unwrap();
        assert_eq!(surface.feature_state(&key).map(|s| s.len()), Some(2));

        surface.remove_layer("zones").unwrap();
        surface.remove_source("zones").unwrap();
        assert!(surface.feature_ids("zones").is_empty());
        assert_eq!(
            surface.set_feature_state(&key, Map::new()),
            Err(SurfaceError::UnknownSource("zones".into()))
        );
    }

    #[test]
    fn rendered_features_only_for_attached_layers() {
        let mut surface = RecordingSurface::new();
        let feature = SurfaceFeature {
            id: Some(1),
            source: "zones".into(),
            properties: Map::new(),
        };
        surface.set_rendered_features("zones", vec![feature.clone()]);
        assert!(surface.query_rendered_features("zones").is_empty());
        attach(&mut surface, "zones");
        assert_eq!(surface.query_rendered_features("zones"), vec![feature]);
    }
}
