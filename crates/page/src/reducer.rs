use std::collections::BTreeMap;
use std::sync::Arc;

use formats::{LayerConfig, MetadataTable, QueryParam, Row, Style, VisualisationConfig};
use layers::{apply_layer_param, route_parameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

/// Per-page business state: layers, visualisations, metadata tables and the
/// loading flag. Filter selections live in a separate store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageState {
    pub layers: BTreeMap<String, LayerConfig>,
    pub visualisations: BTreeMap<String, VisualisationConfig>,
    pub metadata_tables: BTreeMap<String, MetadataTable>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum PageAction {
    AddLayer {
        layer: LayerConfig,
    },
    UpdateParameterisedLayer {
        layer_name: String,
        param_name: String,
        value: Value,
    },
    AddVisualisation {
        visualisation: VisualisationConfig,
    },
    SetIsLoading,
    SetLoadingFinished,
    /// Clears layers only.
    ResetContext,
    UpdateQueryParams {
        visualisation: String,
        params: BTreeMap<String, Value>,
    },
    SetVisualisationData {
        visualisation: String,
        data: Vec<Row>,
    },
    SetVisualisationStyle {
        visualisation: String,
        style: Style,
        #[serde(default)]
        breaks: Vec<f64>,
    },
    SetVisibleData {
        visualisation: String,
        data: Option<Vec<Row>>,
    },
    AddMetadataTable {
        table: MetadataTable,
    },
    #[serde(other)]
    Unknown,
}

impl PageAction {
    pub fn kind(&self) -> &'static str {
        match self {
            PageAction::AddLayer { .. } => "ADD_LAYER",
            PageAction::UpdateParameterisedLayer { .. } => "UPDATE_PARAMETERISED_LAYER",
            PageAction::AddVisualisation { .. } => "ADD_VISUALISATION",
            PageAction::SetIsLoading => "SET_IS_LOADING",
            PageAction::SetLoadingFinished => "SET_LOADING_FINISHED",
            PageAction::ResetContext => "RESET_CONTEXT",
            PageAction::UpdateQueryParams { .. } => "UPDATE_QUERY_PARAMS",
            PageAction::SetVisualisationData { .. } => "SET_VISUALISATION_DATA",
            PageAction::SetVisualisationStyle { .. } => "SET_VISUALISATION_STYLE",
            PageAction::SetVisibleData { .. } => "SET_VISIBLE_DATA",
            PageAction::AddMetadataTable { .. } => "ADD_METADATA_TABLE",
            PageAction::Unknown => "UNKNOWN",
        }
    }
}

fn with_visualisation(
    state: &Arc<PageState>,
    name: &str,
    update: impl FnOnce(&mut VisualisationConfig),
) -> Arc<PageState> {
    let Some(current) = state.visualisations.get(name) else {
        debug!(visualisation = name, "unknown visualisation, action ignored");
        return Arc::clone(state);
    };
    let mut vis = current.clone();
    update(&mut vis);
    if &vis == current {
        return Arc::clone(state);
    }
    let mut next = PageState::clone(state);
    next.visualisations.insert(name.to_string(), vis);
    Arc::new(next)
}

/// Applies `action` to `state`.
///
/// Transitions that change nothing hand back the same `Arc`, so callers can
/// use `Arc::ptr_eq` to skip re-rendering and re-fetching.
pub fn reduce(state: &Arc<PageState>, action: &PageAction) -> Arc<PageState> {
    match action {
        PageAction::AddLayer { layer } => {
            if state.layers.get(&layer.name) == Some(layer) {
                return Arc::clone(state);
            }
            let mut next = PageState::clone(state);
            next.layers.insert(layer.name.clone(), layer.clone());
            Arc::new(next)
        }
        PageAction::UpdateParameterisedLayer {
            layer_name,
            param_name,
            value,
        } => {
            let Some(current) = state.layers.get(layer_name) else {
                debug!(layer = %layer_name, "parameterised update for unknown layer ignored");
                return Arc::clone(state);
            };
            if !route_parameters(current.template()).contains(&param_name.as_str()) {
                debug!(layer = %layer_name, param = %param_name, "layer template has no such parameter");
                return Arc::clone(state);
            }
            let mut layer = current.clone();
            match apply_layer_param(&mut layer, param_name, value) {
                Ok(true) => {
                    let mut next = PageState::clone(state);
                    next.layers.insert(layer_name.clone(), layer);
                    Arc::new(next)
                }
                Ok(false) => Arc::clone(state),
                Err(e) => {
                    debug!(layer = %layer_name, "parameter not applied: {e}");
                    Arc::clone(state)
                }
            }
        }
        PageAction::AddVisualisation { visualisation } => {
            if state.visualisations.get(&visualisation.name) == Some(visualisation) {
                return Arc::clone(state);
            }
            let mut next = PageState::clone(state);
            next.visualisations
                .insert(visualisation.name.clone(), visualisation.clone());
            Arc::new(next)
        }
        PageAction::SetIsLoading | PageAction::SetLoadingFinished => {
            let loading = matches!(action, PageAction::SetIsLoading);
            if state.is_loading == loading {
                return Arc::clone(state);
            }
            let mut next = PageState::clone(state);
            next.is_loading = loading;
            Arc::new(next)
        }
        PageAction::ResetContext => {
            if state.layers.is_empty() {
                return Arc::clone(state);
            }
            let mut next = PageState::clone(state);
            next.layers.clear();
            Arc::new(next)
        }
        PageAction::UpdateQueryParams {
            visualisation,
            params,
        } => with_visualisation(state, visualisation, |vis| {
            for (name, value) in params {
                vis.query_params
                    .entry(name.clone())
                    .or_insert_with(|| QueryParam::optional(Value::Null))
                    .value = value.clone();
            }
        }),
        PageAction::SetVisualisationData {
            visualisation,
            data,
        } => with_visualisation(state, visualisation, |vis| vis.data = data.clone()),
        PageAction::SetVisualisationStyle {
            visualisation,
            style,
            breaks,
        } => with_visualisation(state, visualisation, |vis| {
            vis.style = Some(style.clone());
            vis.breaks = breaks.clone();
        }),
        PageAction::SetVisibleData {
            visualisation,
            data,
        } => with_visualisation(state, visualisation, |vis| vis.visible_data = data.clone()),
        PageAction::AddMetadataTable { table } => {
            if state.metadata_tables.get(&table.name) == Some(table) {
                return Arc::clone(state);
            }
            let mut next = PageState::clone(state);
            next.metadata_tables.insert(table.name.clone(), table.clone());
            Arc::new(next)
        }
        PageAction::Unknown => {
            trace!("unknown page action ignored");
            Arc::clone(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{GeometryType, LayerType, StyleSuffix, VisualisationType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn zones() -> LayerConfig {
        LayerConfig::new("zones", LayerType::Geojson, GeometryType::Polygon, "/api/zones/{zoneTypeId}")
    }

    fn seeded() -> Arc<PageState> {
        let state = Arc::new(PageState::default());
        let state = reduce(&state, &PageAction::AddLayer { layer: zones() });
        reduce(
            &state,
            &PageAction::AddVisualisation {
                visualisation: VisualisationConfig::new("trips", VisualisationType::JoinDataToMap, "/api/trips"),
            },
        )
    }

    #[test]
    fn unknown_actions_keep_the_same_reference() {
        let state = seeded();
        let action: PageAction = serde_json::from_value(json!({"type": "SOMETHING_ELSE", "x": 1})).unwrap();
        assert_eq!(action, PageAction::Unknown);
        assert!(Arc::ptr_eq(&state, &reduce(&state, &action)));
    }

    #[test]
    fn parameterised_layer_resolves_from_template() {
        let state = seeded();
        let action: PageAction = serde_json::from_value(json!({
            "type": "UPDATE_PARAMETERISED_LAYER",
            "layerName": "zones",
            "paramName": "zoneTypeId",
            "value": 8
        }))
        .unwrap();
        let next = reduce(&state, &action);
        assert_eq!(next.layers["zones"].path, "/api/zones/8");
        assert_eq!(next.layers["zones"].path_template.as_deref(), Some("/api/zones/{zoneTypeId}"));

        let again = reduce(
            &next,
            &PageAction::UpdateParameterisedLayer {
                layer_name: "zones".into(),
                param_name: "zoneTypeId".into(),
                value: json!(9),
            },
        );
        assert_eq!(again.layers["zones"].path, "/api/zones/9");
        assert!(Arc::ptr_eq(&again, &reduce(&again, &PageAction::UpdateParameterisedLayer {
            layer_name: "zones".into(),
            param_name: "zoneTypeId".into(),
            value: json!(9),
        })));
    }

    #[test]
    fn parameterised_layer_no_ops() {
        let state = seeded();
        for action in [
            PageAction::UpdateParameterisedLayer {
                layer_name: "missing".into(),
                param_name: "zoneTypeId".into(),
                value: json!(1),
            },
            PageAction::UpdateParameterisedLayer {
                layer_name: "zones".into(),
                param_name: "other".into(),
                value: json!(1),
            },
            PageAction::UpdateParameterisedLayer {
                layer_name: "zones".into(),
                param_name: "zoneTypeId".into(),
                value: Value::Null,
            },
        ] {
            assert!(Arc::ptr_eq(&state, &reduce(&state, &action)), "{}", action.kind());
        }
    }

    #[test]
    fn reset_context_clears_layers_only() {
        let state = seeded();
        let next = reduce(&state, &PageAction::ResetContext);
        assert!(next.layers.is_empty());
        assert_eq!(next.visualisations.len(), 1);
        assert!(Arc::ptr_eq(&next, &reduce(&next, &PageAction::ResetContext)));
    }

    #[test]
    fn loading_flags_toggle_once() {
        let state = seeded();
        let loading = reduce(&state, &PageAction::SetIsLoading);
        assert!(loading.is_loading);
        assert!(Arc::ptr_eq(&loading, &reduce(&loading, &PageAction::SetIsLoading)));
        assert!(!reduce(&loading, &PageAction::SetLoadingFinished).is_loading);
    }

    #[test]
    fn visualisation_updates() {
        let state = seeded();
        let next = reduce(
            &state,
            &PageAction::UpdateQueryParams {
                visualisation: "trips".into(),
                params: BTreeMap::from([("year".to_string(), json!(2030))]),
            },
        );
        assert_eq!(next.visualisations["trips"].query_params["year"].value, json!(2030));

        let styled = reduce(
            &next,
            &PageAction::SetVisualisationStyle {
                visualisation: "trips".into(),
                style: Style::new("polygon", StyleSuffix::Diverging),
                breaks: vec![-1.0, 0.0, 1.0],
            },
        );
        assert_eq!(styled.visualisations["trips"].breaks, vec![-1.0, 0.0, 1.0]);

        let ignored = PageAction::SetVisualisationData {
            visualisation: "nope".into(),
            data: vec![],
        };
        assert!(Arc::ptr_eq(&styled, &reduce(&styled, &ignored)));
    }
}
