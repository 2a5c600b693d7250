use std::collections::BTreeMap;

use formats::LayerConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::params::{apply_layer_param, unresolved_params};

/// Layers held back from the active set until every route parameter in their
/// path has a value.
///
/// Keyed by layer name so the queue order is stable.
#[derive(Debug, Default, Clone)]
pub struct PendingLayers {
    waiting: BTreeMap<String, LayerConfig>,
}

impl PendingLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.waiting.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&LayerConfig> {
        self.waiting.get(name)
    }

    /// Parameters the named layer is still waiting on.
    pub fn waiting_on(&self, name: &str) -> Vec<String> {
        self.waiting.get(name).map(unresolved_params).unwrap_or_default()
    }

    /// Substitutes every parameter `lookup` knows about.
    ///
    /// Returns the layer when it is fully resolved; otherwise queues it and
    /// returns `None`.
    pub fn admit(
        &mut self,
        mut layer: LayerConfig,
        lookup: impl Fn(&str) -> Option<Value>,
    ) -> Option<LayerConfig> {
        for name in unresolved_params(&layer) {
            let Some(value) = lookup(&name).filter(|v| !v.is_null()) else {
                continue;
            };
            if let Err(e) = apply_layer_param(&mut layer, &name, &value) {
                warn!(layer = %layer.name, "skipping parameter: {e}");
            }
        }

        if unresolved_params(&layer).is_empty() {
            return Some(layer);
        }
        debug!(layer = %layer.name, waiting_on = ?unresolved_params(&layer), "layer queued");
        self.waiting.insert(layer.name.clone(), layer);
        None
    }

    /// Supplies `param` to one queued layer, returning it once complete.
    pub fn supply_to(&mut self, layer_name: &str, param: &str, value: &Value) -> Option<LayerConfig> {
        let layer = self.waiting.get_mut(layer_name)?;
        if let Err(e) = apply_layer_param(layer, param, value) {
            debug!(layer = layer_name, "parameter not applied: {e}");
            return None;
        }
        if !unresolved_params(layer).is_empty() {
            return None;
        }
        self.waiting.remove(layer_name)
    }

    /// Supplies `param` to every queued layer that uses it, returning the
    /// layers that became complete, in name order.
    pub fn supply(&mut self, param: &str, value: &Value) -> Vec<LayerConfig> {
        let names: Vec<String> = self
            .waiting
            .iter()
            .filter(|(_, layer)| unresolved_params(layer).iter().any(|p| p == param))
            .map(|(name, _)| name.clone())
            .collect();
        names
            .into_iter()
            .filter_map(|name| self.supply_to(&name, param, value))
            .collect()
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
    }
}
