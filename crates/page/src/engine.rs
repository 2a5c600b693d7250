//! Page orchestration.
//!
//! [`PageEngine`] owns one page instance: its reducer state, filter store,
//! queued layers, debounced fetches and the feature-state synchroniser. Hosts
//! drive it with explicit timestamps and call [`PageEngine::advance`] when
//! timers may be due; nothing here sleeps or reads the wall clock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use compute::sample::{column, evenly_spaced, numeric};
use compute::{classify, determine_dynamic_style};
use filters::{FilterStore, assign_filter_ids, populate_options, update_filter_validity};
use formats::{
    FilterAction, FilterActionKind, FilterConfig, GeometryType, LayerConfig, MetadataTable,
    PageConfig, Row, Style, StyleSuffix, VisualisationConfig, is_empty_selection, normalize_rows,
};
use layers::{PendingLayers, route_parameters};
use runtime::metrics::{self, Metrics};
use runtime::{Debouncer, EventBus, Millis};
use serde_json::Value;
use surface::{
    FeatureStateSync, FeatureValue, LayerSpec, RenderSurface, SourceSpec, SyncJob, SyncOutcome,
    build_paint,
};
use tracing::{debug, info, warn};

use crate::fetch::{DataSource, FetchRequest};
use crate::reducer::{PageAction, PageState, reduce};
use crate::settings::EngineSettings;

/// A filter action the engine does not apply itself, handed to UI
/// collaborators together with the value that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct CollaboratorAction {
    pub filter_id: String,
    pub action: FilterAction,
    pub value: Value,
}

fn geometry_base(geometry: GeometryType) -> &'static str {
    match geometry {
        GeometryType::Polygon => "polygon",
        GeometryType::Line => "line",
        GeometryType::Point => "point",
    }
}

pub struct PageEngine<S: RenderSurface, D: DataSource> {
    settings: EngineSettings,
    surface: S,
    source: D,
    state: Arc<PageState>,
    filters: Vec<FilterConfig>,
    store: FilterStore,
    pending_layers: PendingLayers,
    sync: FeatureStateSync,
    fetches: Debouncer<String>,
    viewport: Debouncer<String>,
    map_ready: bool,
    mounted: bool,
    outbox: Vec<CollaboratorAction>,
    events: EventBus,
    metrics: Metrics,
}

impl<S: RenderSurface, D: DataSource> PageEngine<S, D> {
    pub fn new(settings: EngineSettings, surface: S, source: D) -> Self {
        let sync = FeatureStateSync::new(settings.retry_base_ms, settings.retry_max_attempts);
        let fetches = Debouncer::new(settings.fetch_debounce_ms);
        let viewport = Debouncer::new(settings.viewport_debounce_ms);
        Self {
            settings,
            surface,
            source,
            state: Arc::new(PageState::default()),
            filters: Vec::new(),
            store: FilterStore::new(),
            pending_layers: PendingLayers::new(),
            sync,
            fetches,
            viewport,
            map_ready: false,
            mounted: false,
            outbox: Vec::new(),
            events: EventBus::new(),
            metrics: Metrics::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> &Arc<PageState> {
        &self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn filters(&self) -> &[FilterConfig] {
        &self.filters
    }

    pub fn filter(&self, id: &str) -> Option<&FilterConfig> {
        self.filters.iter().find(|f| f.id == id)
    }

    pub fn filter_store(&self) -> &FilterStore {
        &self.store
    }

    pub fn pending_layers(&self) -> &PendingLayers {
        &self.pending_layers
    }

    pub fn feature_sync(&self) -> &FeatureStateSync {
        &self.sync
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_fetch_pending(&self, visualisation: &str) -> bool {
        self.fetches.is_pending(&visualisation.to_string())
    }

    pub fn is_viewport_refresh_pending(&self, visualisation: &str) -> bool {
        self.viewport.is_pending(&visualisation.to_string())
    }

    /// Collaborator actions queued since the last call.
    pub fn take_outbox(&mut self) -> Vec<CollaboratorAction> {
        std::mem::take(&mut self.outbox)
    }

    /// Runs the reducer; returns whether the state changed.
    pub fn dispatch(&mut self, action: PageAction) -> bool {
        let next = reduce(&self.state, &action);
        if Arc::ptr_eq(&next, &self.state) {
            debug!(action = action.kind(), "no state change");
            return false;
        }
        self.state = next;
        true
    }

    /// Seeds the page from `config`.
    ///
    /// Metadata tables are fetched first since filter options and validity
    /// depend on them. Fetch failures leave an empty table behind.
    pub async fn load(&mut self, config: PageConfig, now: Millis) {
        self.mounted = true;
        self.dispatch(PageAction::SetIsLoading);
        self.events.emit(now, "page", "load started");

        for table_config in &config.metadata_tables {
            let request = FetchRequest::get(table_config.path.clone());
            let rows = match self.source.fetch(request).await {
                Ok(body) => {
                    self.metrics.inc(metrics::FETCH_OK);
                    normalize_rows(body)
                }
                Err(e) => {
                    warn!(table = %table_config.name, "metadata fetch failed: {e}");
                    self.metrics.inc(metrics::FETCH_FAILED);
                    self.events
                        .emit(now, "fetch", format!("metadata {} failed: {e}", table_config.name));
                    Vec::new()
                }
            };
            let table = MetadataTable::from_fetched(table_config, rows);
            self.dispatch(PageAction::AddMetadataTable { table });
        }

        let mut filters = config.filters;
        assign_filter_ids(&mut filters);
        populate_options(&mut filters, &self.state.metadata_tables);
        self.store = FilterStore::with_defaults(&filters);
        self.filters = filters;

        for layer in config.layers {
            let filters = &self.filters;
            let store = &self.store;
            let admitted = self
                .pending_layers
                .admit(layer, |param| store.value_for_param(filters, param));
            if let Some(layer) = admitted {
                self.dispatch(PageAction::AddLayer { layer });
            }
        }

        for mut vis in config.visualisations {
            for filter in &self.filters {
                let Some(value) = self.store.get(&filter.id).filter(|v| !is_empty_selection(v)) else {
                    continue;
                };
                for action in filter.actions.iter().filter(|a| a.action == FilterActionKind::UpdateQueryParams) {
                    let param = action.payload_str("paramName").unwrap_or(filter.param_name.as_str());
                    let targeted = action
                        .payload_str("visualisation")
                        .is_none_or(|name| name == vis.name);
                    if targeted && let Some(entry) = vis.query_params.get_mut(param) {
                        entry.value = value.clone();
                    }
                }
            }
            self.dispatch(PageAction::AddVisualisation { visualisation: vis });
        }

        self.recompute_validity();

        if self.map_ready {
            let layers: Vec<LayerConfig> = self.state.layers.values().cloned().collect();
            for layer in &layers {
                self.attach_layer(layer, now);
            }
        }

        let names: Vec<String> = self.state.visualisations.keys().cloned().collect();
        for name in names {
            self.fetches.call(name, now);
        }

        self.dispatch(PageAction::SetLoadingFinished);
        info!(
            layers = self.state.layers.len(),
            queued = self.pending_layers.len(),
            visualisations = self.state.visualisations.len(),
            filters = self.filters.len(),
            "page loaded"
        );
        self.events.emit(now, "page", "load finished");
    }

    /// The renderer is ready: attaches every active layer.
    ///
    /// May arrive before [`PageEngine::load`]; layers are then attached as
    /// soon as the page is loaded.
    pub fn map_loaded(&mut self, now: Millis) {
        self.map_ready = true;
        if !self.mounted {
            return;
        }
        let layers: Vec<LayerConfig> = self.state.layers.values().cloned().collect();
        for layer in &layers {
            self.attach_layer(layer, now);
        }
    }

    /// Stores a filter selection and applies its actions.
    pub fn set_filter_value(&mut self, id: &str, value: Value, now: Millis) {
        if !self.mounted {
            return;
        }
        let Some(filter) = self.filter(id).cloned() else {
            warn!(filter = id, "unknown filter");
            return;
        };
        self.store.set(id, value.clone());
        self.events.emit(now, "filter", format!("{id} = {value}"));

        let mut dirty: BTreeSet<String> = BTreeSet::new();
        for action in &filter.actions {
            match action.action {
                FilterActionKind::UpdateQueryParams => {
                    self.update_query_params(&filter, action, &value, &mut dirty);
                }
                FilterActionKind::UpdateParameterisedLayer => {
                    self.update_parameterised_layers(&filter, action, &value, now, &mut dirty);
                }
                FilterActionKind::UpdateLegendText
                | FilterActionKind::SetSelectedFeatures
                | FilterActionKind::Other => {
                    self.outbox.push(CollaboratorAction {
                        filter_id: filter.id.clone(),
                        action: action.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        self.recompute_validity();
        for name in dirty {
            self.fetches.call(name, now);
        }
    }

    /// The renderer finished moving; refreshes viewport-restricted data later.
    pub fn viewport_settled(&mut self, now: Millis) {
        if !self.mounted {
            return;
        }
        let names: Vec<String> = self
            .state
            .visualisations
            .values()
            .filter(|v| v.filter_to_viewport)
            .map(|v| v.name.clone())
            .collect();
        for name in names {
            self.viewport.call(name, now);
        }
    }

    /// Runs whatever is due at `now`: debounced fetches, viewport refreshes
    /// and feature-state retries, in that order.
    pub async fn advance(&mut self, now: Millis) {
        if !self.mounted {
            return;
        }
        while let Some(name) = self.fetches.pop_ready(now) {
            self.run_fetch(&name, now).await;
        }
        for name in self.viewport.drain_ready(now) {
            self.refresh_visible_data(&name);
        }
        let outcomes = self
            .sync
            .run_due_retries(&mut self.surface, &self.state.layers, now);
        for (layer, outcome) in outcomes {
            self.record_sync(&layer, &outcome, now);
        }
    }

    /// Tears the page down: drops every pending fetch and retry so nothing
    /// touches the renderer afterwards. The renderer itself stays ready for a
    /// later [`PageEngine::load`]. Returns how many tasks were cancelled.
    pub fn unmount(&mut self, now: Millis) -> usize {
        let cancelled =
            self.fetches.cancel_all() + self.viewport.cancel_all() + self.sync.reset();
        self.pending_layers.clear();
        self.dispatch(PageAction::ResetContext);
        self.mounted = false;
        info!(cancelled, "page unmounted");
        self.events
            .emit(now, "page", format!("unmounted, {cancelled} tasks cancelled"));
        cancelled
    }

    fn recompute_validity(&mut self) {
        let updated = update_filter_validity(
            &self.filters,
            &self.state.metadata_tables,
            self.store.state(),
            &self.settings.group_identifiers,
        );
        for filter in updated {
            if let Some(slot) = self.filters.iter_mut().find(|f| f.id == filter.id) {
                *slot = filter;
            }
        }
    }

    fn update_query_params(
        &mut self,
        filter: &FilterConfig,
        action: &FilterAction,
        value: &Value,
        dirty: &mut BTreeSet<String>,
    ) {
        let param = action
            .payload_str("paramName")
            .unwrap_or(filter.param_name.as_str())
            .to_string();
        let targets: Vec<String> = self
            .state
            .visualisations
            .values()
            .filter(|vis| {
                action
                    .payload_str("visualisation")
                    .map_or(vis.query_params.contains_key(&param), |name| name == vis.name)
            })
            .map(|vis| vis.name.clone())
            .collect();
        for visualisation in targets {
            let changed = self.dispatch(PageAction::UpdateQueryParams {
                visualisation: visualisation.clone(),
                params: BTreeMap::from([(param.clone(), value.clone())]),
            });
            if changed {
                dirty.insert(visualisation);
            }
        }
    }

    fn update_parameterised_layers(
        &mut self,
        filter: &FilterConfig,
        action: &FilterAction,
        value: &Value,
        now: Millis,
        dirty: &mut BTreeSet<String>,
    ) {
        if is_empty_selection(value) {
            debug!(filter = %filter.id, "no value yet, layer parameters left alone");
            return;
        }
        let param = action
            .payload_str("paramName")
            .unwrap_or(filter.param_name.as_str())
            .to_string();
        let only_layer = action.payload_str("layerName");

        let completed: Vec<LayerConfig> = match only_layer {
            Some(name) => self
                .pending_layers
                .supply_to(name, &param, value)
                .into_iter()
                .collect(),
            None => self.pending_layers.supply(&param, value),
        };
        let mut touched: Vec<LayerConfig> = Vec::new();
        for layer in completed {
            info!(layer = %layer.name, "queued layer resolved");
            self.dispatch(PageAction::AddLayer { layer: layer.clone() });
            touched.push(layer);
        }

        let active: Vec<String> = self
            .state
            .layers
            .values()
            .filter(|l| only_layer.is_none_or(|name| name == l.name))
            .filter(|l| route_parameters(l.template()).contains(&param.as_str()))
            .map(|l| l.name.clone())
            .collect();
        for layer_name in active {
            let changed = self.dispatch(PageAction::UpdateParameterisedLayer {
                layer_name: layer_name.clone(),
                param_name: param.clone(),
                value: value.clone(),
            });
            if changed && let Some(layer) = self.state.layers.get(&layer_name) {
                touched.push(layer.clone());
            }
        }

        for layer in &touched {
            self.attach_layer(layer, now);
            for vis in self.state.visualisations.values() {
                if vis.join_layer.as_deref() == Some(layer.name.as_str()) {
                    dirty.insert(vis.name.clone());
                }
            }
        }
    }

    /// Adds the layer's source and layer to the surface, replacing both when
    /// the layer's path moved.
    fn attach_layer(&mut self, layer: &LayerConfig, now: Millis) {
        if !self.map_ready {
            return;
        }
        let spec = SourceSpec::from_layer(layer);
        if self.surface.get_layer(&layer.name).is_some() {
            if self.surface.get_source(&layer.name) == Some(&spec) {
                return;
            }
            if let Err(e) = self.surface.remove_layer(&layer.name) {
                warn!(layer = %layer.name, "remove layer failed: {e}");
            }
            if let Err(e) = self.surface.remove_source(&layer.name) {
                warn!(layer = %layer.name, "remove source failed: {e}");
            }
            self.sync.forget_layer(&layer.name);
        } else if self.surface.get_source(&layer.name).is_some()
            && let Err(e) = self.surface.remove_source(&layer.name)
        {
            warn!(layer = %layer.name, "remove stale source failed: {e}");
        }

        if let Err(e) = self.surface.add_source(&layer.name, spec) {
            warn!(layer = %layer.name, "add source failed: {e}");
            return;
        }
        if let Err(e) = self.surface.add_layer(LayerSpec::from_layer(layer)) {
            warn!(layer = %layer.name, "add layer failed: {e}");
            return;
        }
        debug!(layer = %layer.name, path = %layer.path, "layer attached");
        self.events
            .emit(now, "layer", format!("attached {} at {}", layer.name, layer.path));
    }

    async fn fetch_rows(&mut self, request: FetchRequest, what: &str, now: Millis) -> Vec<Row> {
        let path = request.path.clone();
        match self.source.fetch(request).await {
            Ok(body) => {
                let rows = normalize_rows(body);
                self.metrics.inc(metrics::FETCH_OK);
                self.metrics.record(metrics::FETCH_ROWS, rows.len() as u64);
                rows
            }
            Err(e) => {
                warn!(path = %path, what, "fetch failed: {e}");
                self.metrics.inc(metrics::FETCH_FAILED);
                self.events.emit(now, "fetch", format!("{what} {path} failed: {e}"));
                Vec::new()
            }
        }
    }

    fn join_geometry(&self, vis: &VisualisationConfig) -> Option<GeometryType> {
        let name = vis.join_layer.as_deref()?;
        self.state
            .layers
            .get(name)
            .or_else(|| self.pending_layers.get(name))
            .map(|l| l.geometry_type)
    }

    async fn run_fetch(&mut self, name: &str, now: Millis) {
        let Some(vis) = self.state.visualisations.get(name).cloned() else {
            return;
        };
        if !vis.is_ready_to_fetch() {
            debug!(
                visualisation = name,
                missing = ?vis.missing_required_params(),
                "required query params unset, fetch skipped"
            );
            self.metrics.inc(metrics::FETCH_SKIPPED);
            self.events.emit(now, "fetch", format!("{name} skipped"));
            return;
        }

        let request = FetchRequest {
            path: vis.data_path.clone(),
            method: vis.method,
            params: vis.request_params(),
        };
        let geometry = self.join_geometry(&vis);
        let base = vis
            .style
            .as_ref()
            .map(|s| s.base.clone())
            .unwrap_or_else(|| geometry_base(geometry.unwrap_or(GeometryType::Polygon)).to_string());

        let dynamic = if vis.dynamic_style {
            let sample_request = request
                .clone()
                .with_param("limit", self.settings.sample_size.to_string());
            let sample_rows = self.fetch_rows(sample_request, "sample", now).await;
            let sample = column(&sample_rows, &vis.value_field);
            Some(determine_dynamic_style(Some(sample.as_slice()), &base))
        } else {
            None
        };

        let rows = self.fetch_rows(request, "data", now).await;
        self.events
            .emit(now, "fetch", format!("{name} fetched {} rows", rows.len()));
        self.dispatch(PageAction::SetVisualisationData {
            visualisation: name.to_string(),
            data: rows.clone(),
        });

        if vis.joins_map() {
            let style = dynamic
                .or(vis.style.clone())
                .unwrap_or_else(|| Style::new(base, StyleSuffix::Continuous));
            self.apply_to_map(&vis, &rows, style, geometry, now);
        }
        if vis.filter_to_viewport {
            self.refresh_visible_data(name);
        }
    }

    fn apply_to_map(
        &mut self,
        vis: &VisualisationConfig,
        rows: &[Row],
        style: Style,
        geometry: Option<GeometryType>,
        now: Millis,
    ) {
        let Some(layer) = vis.join_layer.clone() else {
            return;
        };
        let values = column(rows, &vis.value_field);
        let breaks = match style.suffix {
            StyleSuffix::Categorical => Vec::new(),
            StyleSuffix::Continuous | StyleSuffix::Diverging => {
                let sample = evenly_spaced(&values, self.settings.sample_size);
                classify(vis.classification, &numeric(&sample), self.settings.class_count).breaks
            }
        };
        self.dispatch(PageAction::SetVisualisationStyle {
            visualisation: vis.name.clone(),
            style: style.clone(),
            breaks: breaks.clone(),
        });

        let Some(geometry) = geometry else {
            warn!(visualisation = %vis.name, layer = %layer, "join layer unknown, nothing to sync");
            return;
        };
        let job = SyncJob {
            layer: layer.clone(),
            paint: build_paint(geometry, &style, &breaks, &values),
            values: FeatureValue::from_rows(rows, &vis.id_field, &vis.value_field),
        };
        let outcome = self
            .sync
            .sync(&mut self.surface, &self.state.layers, job, now);
        self.record_sync(&layer, &outcome, now);
    }

    /// Narrows a visualisation's data to the features currently on screen.
    fn refresh_visible_data(&mut self, name: &str) {
        let Some(vis) = self.state.visualisations.get(name) else {
            return;
        };
        let Some(layer) = vis.join_layer.as_deref() else {
            return;
        };
        let on_screen: BTreeSet<u64> = self
            .surface
            .query_rendered_features(layer)
            .into_iter()
            .filter_map(|f| f.id)
            .collect();
        let visible: Vec<Row> = vis
            .data
            .iter()
            .filter(|row| {
                FeatureValue::from_row(row, &vis.id_field, &vis.value_field)
                    .is_some_and(|f| on_screen.contains(&f.id))
            })
            .cloned()
            .collect();
        debug!(visualisation = name, visible = visible.len(), "visible data refreshed");
        self.dispatch(PageAction::SetVisibleData {
            visualisation: name.to_string(),
            data: Some(visible),
        });
    }

    fn record_sync(&mut self, layer: &str, outcome: &SyncOutcome, now: Millis) {
        match outcome {
            SyncOutcome::Applied { set, removed } => {
                self.metrics.inc_by(metrics::SYNC_SET, *set as u64);
                self.metrics.inc_by(metrics::SYNC_REMOVED, *removed as u64);
            }
            SyncOutcome::Deferred { .. } => self.metrics.inc(metrics::SYNC_RETRY),
            SyncOutcome::GaveUp { .. } => self.metrics.inc(metrics::SYNC_GAVE_UP),
            SyncOutcome::Skipped => {}
        }
        self.events.emit(now, "sync", format!("{layer}: {outcome:?}"));
    }
}
