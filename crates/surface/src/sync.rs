use std::collections::BTreeMap;

use formats::{LayerConfig, Row, value_as_f64};
use runtime::{Millis, TimerId, TimerQueue};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::paint::PaintSpec;
use crate::surface::{FeatureKey, RenderSurface};

pub const DEFAULT_RETRY_BASE_MS: u64 = 100;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One row's contribution to feature state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureValue {
    pub id: u64,
    pub value: Value,
}

fn coerce_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl FeatureValue {
    /// Reads `id_field` as a numeric feature id; rows without one are skipped.
    pub fn from_row(row: &Row, id_field: &str, value_field: &str) -> Option<Self> {
        let id = row.get(id_field).and_then(coerce_id)?;
        let value = row.get(value_field).cloned().unwrap_or(Value::Null);
        Some(Self { id, value })
    }

    pub fn from_rows(rows: &[Row], id_field: &str, value_field: &str) -> Vec<Self> {
        let values: Vec<Self> = rows
            .iter()
            .filter_map(|row| Self::from_row(row, id_field, value_field))
            .collect();
        if values.len() < rows.len() {
            debug!(
                skipped = rows.len() - values.len(),
                id_field, "rows without a numeric id"
            );
        }
        values
    }

}

// Surfaces merge feature state, so a non-numeric value clears `valueAbs`.
fn feature_state(value: &Value) -> Map<String, Value> {
    let mut state = Map::new();
    state.insert("value".into(), value.clone());
    let abs = value_as_f64(value).map_or(Value::Null, |v| json!(v.abs()));
    state.insert("valueAbs".into(), abs);
    state
}

/// Everything needed to push one visualisation's values onto a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub layer: String,
    pub paint: PaintSpec,
    pub values: Vec<FeatureValue>,
}

/// Identifies an in-flight retry; a newer sync for the layer invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetryToken {
    pub layer: String,
    pub issued_at: Millis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied { set: usize, removed: usize },
    /// The layer is not stylable; nothing was written.
    Skipped,
    /// The layer is not attached yet; another attempt is scheduled.
    Deferred { attempt: u32, due: Millis },
    GaveUp { attempts: u32 },
}

#[derive(Debug)]
struct PendingRetry {
    token: RetryToken,
    job: SyncJob,
    attempt: u32,
}

/// Incremental feature-state writer.
///
/// Keeps, per layer, the values it wrote last time so a refresh only writes
/// the ids whose value changed and removes the ids that dropped out. Layers that are not attached yet are retried on the
/// cooperative timer queue with a linear backoff.
#[derive(Debug)]
pub struct FeatureStateSync {
    retry_base_ms: u64,
    max_attempts: u32,
    applied: BTreeMap<String, BTreeMap<u64, Value>>,
    retries: TimerQueue<PendingRetry>,
    in_flight: BTreeMap<String, (TimerId, RetryToken)>,
}

impl Default for FeatureStateSync {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE_MS, DEFAULT_MAX_ATTEMPTS)
    }
}

impl FeatureStateSync {
    pub fn new(retry_base_ms: u64, max_attempts: u32) -> Self {
        Self {
            retry_base_ms,
            max_attempts: max_attempts.max(1),
            applied: BTreeMap::new(),
            retries: TimerQueue::new(),
            in_flight: BTreeMap::new(),
        }
    }

    pub fn applied_values(&self, layer: &str) -> Option<&BTreeMap<u64, Value>> {
        self.applied.get(layer)
    }

    pub fn pending_retries(&self) -> usize {
        self.in_flight.len()
    }

    pub fn retry_token(&self, layer: &str) -> Option<&RetryToken> {
        self.in_flight.get(layer).map(|(_, token)| token)
    }

    pub fn next_retry_due(&self) -> Option<Millis> {
        self.retries.next_due()
    }

    /// Pushes `job` onto the surface now, superseding any pending retry for
    /// the same layer.
    pub fn sync<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        registry: &BTreeMap<String, LayerConfig>,
        job: SyncJob,
        now: Millis,
    ) -> SyncOutcome {
        if self.cancel_retry(&job.layer) {
            debug!(layer = %job.layer, "superseded pending sync retry");
        }
        self.attempt(surface, registry, job, 1, now)
    }

    /// Runs every retry due at `now`.
    pub fn run_due_retries<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        registry: &BTreeMap<String, LayerConfig>,
        now: Millis,
    ) -> Vec<(String, SyncOutcome)> {
        let mut outcomes = Vec::new();
        while let Some((id, pending)) = self.retries.pop_due(now) {
            if self
                .in_flight
                .get(&pending.token.layer)
                .is_some_and(|(current, _)| *current == id)
            {
                self.in_flight.remove(&pending.token.layer);
            }
            let layer = pending.token.layer.clone();
            let outcome = self.attempt(surface, registry, pending.job, pending.attempt, now);
            outcomes.push((layer, outcome));
        }
        outcomes
    }

    /// Drops the recorded ids and any pending retry for `layer`.
    ///
    /// Used when a layer is re-created so the next sync starts from scratch.
    pub fn forget_layer(&mut self, layer: &str) {
        self.applied.remove(layer);
        self.cancel_retry(layer);
    }

    /// Cancels every pending retry; returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        self.in_flight.clear();
        self.retries.clear()
    }

    pub fn reset(&mut self) -> usize {
        self.applied.clear();
        self.cancel_all()
    }

    fn cancel_retry(&mut self, layer: &str) -> bool {
        match self.in_flight.remove(layer) {
            Some((id, _)) => self.retries.cancel(id).is_some(),
            None => false,
        }
    }

    fn attempt<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        registry: &BTreeMap<String, LayerConfig>,
        job: SyncJob,
        attempt: u32,
        now: Millis,
    ) -> SyncOutcome {
        let config = match registry.get(&job.layer) {
            Some(config) if surface.get_layer(&job.layer).is_some() => config,
            _ => return self.defer(job, attempt, now),
        };
        if !config.is_stylable {
            debug!(layer = %job.layer, "layer not stylable, sync skipped");
            return SyncOutcome::Skipped;
        }

        // Later rows win when an id repeats.
        let current: BTreeMap<u64, &Value> = job.values.iter().map(|v| (v.id, &v.value)).collect();
        if config.preserve_base_style {
            let filter = json!(["in", ["id"], ["literal", current.keys().collect::<Vec<_>>()]]);
            if let Err(err) = surface.set_filter(&job.layer, Some(filter)) {
                warn!(layer = %job.layer, %err, "set filter failed");
            }
        } else {
            for (property, value) in &job.paint {
                if let Err(err) = surface.set_paint_property(&job.layer, property, value.clone()) {
                    warn!(layer = %job.layer, property = %property, %err, "set paint failed");
                }
            }
        }

        let source_layer = config.source_layer.clone();
        let previous = self.applied.remove(&job.layer).unwrap_or_default();
        let mut written = BTreeMap::new();
        let mut set = 0;
        for (&id, &value) in &current {
            if previous.get(&id) == Some(value) {
                written.insert(id, value.clone());
                continue;
            }
            let key = FeatureKey::new(config.name.clone(), source_layer.clone(), id);
            match surface.set_feature_state(&key, feature_state(value)) {
                Ok(()) => {
                    set += 1;
                    written.insert(id, value.clone());
                }
                Err(err) => warn!(layer = %job.layer, id, %err, "set feature state failed"),
            }
        }

        let mut removed = 0;
        for (id, value) in previous {
            if current.contains_key(&id) {
                continue;
            }
            let key = FeatureKey::new(config.name.clone(), source_layer.clone(), id);
            match surface.remove_feature_state(&key) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(layer = %job.layer, id, %err, "remove feature state failed");
                    // still on the surface; the next refresh tries again
                    written.insert(id, value);
                }
            }
        }
        self.applied.insert(job.layer.clone(), written);
        debug!(layer = %job.layer, set, removed, attempt, "feature state synced");
        SyncOutcome::Applied { set, removed }
    }

    fn defer(&mut self, job: SyncJob, attempt: u32, now: Millis) -> SyncOutcome {
        if attempt >= self.max_attempts {
            warn!(layer = %job.layer, attempts = attempt, "layer never attached, giving up on sync");
            return SyncOutcome::GaveUp { attempts: attempt };
        }
        let due = now.after(self.retry_base_ms.saturating_mul(u64::from(attempt)));
        let token = RetryToken {
            layer: job.layer.clone(),
            issued_at: now,
        };
        debug!(layer = %job.layer, attempt, %due, "layer not attached, retry scheduled");
        let id = self.retries.schedule(
            due,
            PendingRetry {
                token: token.clone(),
                job,
                attempt: attempt + 1,
            },
        );
        self.in_flight.insert(token.layer.clone(), (id, token));
        SyncOutcome::Deferred {
            attempt: attempt + 1,
            due,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{RecordingSurface, SurfaceCall};
    use crate::surface::{LayerSpec, SourceSpec};
    use formats::{GeometryType, LayerType};
    use pretty_assertions::assert_eq;

    fn registry(layer: LayerConfig) -> BTreeMap<String, LayerConfig> {
        BTreeMap::from([(layer.name.clone(), layer)])
    }

    fn zones() -> LayerConfig {
        LayerConfig::new("zones", LayerType::Geojson, GeometryType::Polygon, "/zones.geojson")
    }

    fn attach(surface: &mut RecordingSurface, layer: &LayerConfig) {
        surface.add_source(&layer.name, SourceSpec::from_layer(layer)).unwrap();
        surface.add_layer(LayerSpec::from_layer(layer)).unwrap();
    }

    fn job(ids: &[i64]) -> SyncJob {
        let mut paint = PaintSpec::new();
        paint.insert("fill-opacity".into(), json!(0.8));
        SyncJob {
            layer: "zones".into(),
            paint,
            values: ids
                .iter()
                .map(|id| FeatureValue {
                    id: *id as u64,
                    value: json!(-(*id as f64)),
                })
                .collect(),
        }
    }

    #[test]
    fn from_row_coerces_ids() {
        let row: Row = json!({"zone": "12", "v": 3}).as_object().cloned().unwrap();
        assert_eq!(
            FeatureValue::from_row(&row, "zone", "v"),
            Some(FeatureValue { id: 12, value: json!(3) })
        );
        let row: Row = json!({"zone": 4.0}).as_object().cloned().unwrap();
        assert_eq!(FeatureValue::from_row(&row, "zone", "v").map(|f| f.id), Some(4));
        let row: Row = json!({"zone": "abc"}).as_object().cloned().unwrap();
        assert_eq!(FeatureValue::from_row(&row, "zone", "v"), None);
    }

    #[test]
    fn identical_second_sync_writes_nothing() {
        let layer = zones();
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();

        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1, 2, 3]), Millis(0)),
            SyncOutcome::Applied { set: 3, removed: 0 }
        );
        surface.take_calls();
        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1, 2, 3]), Millis(10)),
            SyncOutcome::Applied { set: 0, removed: 0 }
        );
        assert!(surface.removed_ids().is_empty());
        assert!(
            !surface
                .calls()
                .iter()
                .any(|c| matches!(c, SurfaceCall::SetFeatureState { .. }))
        );
    }

    #[test]
    fn only_changed_values_are_rewritten() {
        let layer = zones();
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[1, 2, 3]), Millis(0));
        let mut next = job(&[1, 2, 3]);
        next.values[1].value = json!(42);
        assert_eq!(
            sync.sync(&mut surface, &registry, next, Millis(10)),
            SyncOutcome::Applied { set: 1, removed: 0 }
        );
        assert_eq!(
            sync.applied_values("zones").and_then(|v| v.get(&2)),
            Some(&json!(42))
        );
        let state = surface.feature_state(&FeatureKey::new("zones", None, 2)).cloned().unwrap();
        assert_eq!(state["value"], json!(42));
    }

    #[test]
    fn failed_writes_are_retried_on_the_next_sync() {
        let layer = zones();
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer.clone());
        let mut sync = FeatureStateSync::default();

        surface.remove_source("zones").unwrap();
        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1]), Millis(0)),
            SyncOutcome::Applied { set: 0, removed: 0 }
        );
        assert_eq!(sync.applied_values("zones").map(|v| v.len()), Some(0));

        surface.add_source("zones", SourceSpec::from_layer(&layer)).unwrap();
        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1]), Millis(10)),
            SyncOutcome::Applied { set: 1, removed: 0 }
        );
    }

    #[test]
    fn non_numeric_value_clears_value_abs() {
        let layer = zones();
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[4]), Millis(0));
        let mut next = job(&[4]);
        next.values[0].value = json!("n/a");
        sync.sync(&mut surface, &registry, next, Millis(10));

        let state = surface.feature_state(&FeatureKey::new("zones", None, 4)).cloned().unwrap();
        assert_eq!(state["value"], json!("n/a"));
        assert_eq!(state["valueAbs"], Value::Null);
    }

    #[test]
    fn shrinking_rows_removes_exactly_the_dropped_id() {
        let layer = zones();
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[1, 2, 3]), Millis(0));
        let outcome = sync.sync(&mut surface, &registry, job(&[1, 3]), Millis(10));

        assert_eq!(outcome, SyncOutcome::Applied { set: 0, removed: 1 });
        assert_eq!(surface.removed_ids(), vec![2]);
        assert_eq!(surface.feature_ids("zones"), vec![1, 3]);
        let state = surface
            .feature_state(&FeatureKey::new("zones", None, 3))
            .cloned()
            .unwrap();
        assert_eq!(state["value"], json!(-3.0));
        assert_eq!(state["valueAbs"], json!(3.0));
    }

    #[test]
    fn preserve_base_style_filters_instead_of_painting() {
        let mut layer = zones();
        layer.preserve_base_style = true;
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[5, 2]), Millis(0));
        let spec = surface.get_layer("zones").unwrap();
        assert!(spec.paint.is_empty());
        assert_eq!(spec.filter, Some(json!(["in", ["id"], ["literal", [2, 5]]])));
    }

    #[test]
    fn non_stylable_layers_are_skipped() {
        let mut layer = zones();
        layer.is_stylable = false;
        let mut surface = RecordingSurface::new();
        attach(&mut surface, &layer);
        let registry = registry(layer);
        let mut sync = FeatureStateSync::default();
        surface.take_calls();

        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1]), Millis(0)),
            SyncOutcome::Skipped
        );
        assert!(surface.calls().is_empty());
    }

    #[test]
    fn retries_with_linear_backoff_then_gives_up() {
        let layer = zones();
        let registry = registry(layer);
        let mut surface = RecordingSurface::new();
        let mut sync = FeatureStateSync::new(100, 3);

        assert_eq!(
            sync.sync(&mut surface, &registry, job(&[1]), Millis(0)),
            SyncOutcome::Deferred { attempt: 2, due: Millis(100) }
        );
        assert!(sync.run_due_retries(&mut surface, &registry, Millis(99)).is_empty());
        assert_eq!(
            sync.run_due_retries(&mut surface, &registry, Millis(100)),
            vec![("zones".to_string(), SyncOutcome::Deferred { attempt: 3, due: Millis(300) })]
        );
        assert_eq!(
            sync.run_due_retries(&mut surface, &registry, Millis(300)),
            vec![("zones".to_string(), SyncOutcome::GaveUp { attempts: 3 })]
        );
        assert_eq!(sync.pending_retries(), 0);
    }

    #[test]
    fn retry_applies_once_layer_attaches() {
        let layer = zones();
        let registry = registry(layer.clone());
        let mut surface = RecordingSurface::new();
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[1, 2]), Millis(0));
        attach(&mut surface, &layer);
        let outcomes = sync.run_due_retries(&mut surface, &registry, Millis(100));
        assert_eq!(outcomes, vec![("zones".to_string(), SyncOutcome::Applied { set: 2, removed: 0 })]);
    }

    #[test]
    fn newer_sync_supersedes_pending_retry() {
        let layer = zones();
        let registry = registry(layer.clone());
        let mut surface = RecordingSurface::new();
        let mut sync = FeatureStateSync::default();

        sync.sync(&mut surface, &registry, job(&[1, 2]), Millis(0));
        assert_eq!(
            sync.retry_token("zones"),
            Some(&RetryToken { layer: "zones".into(), issued_at: Millis(0) })
        );
        sync.sync(&mut surface, &registry, job(&[7]), Millis(50));
        assert_eq!(sync.retry_token("zones").map(|t| t.issued_at), Some(Millis(50)));
        assert_eq!(sync.pending_retries(), 1);

        attach(&mut surface, &layer);
        assert!(sync.run_due_retries(&mut surface, &registry, Millis(100)).is_empty());
        let outcomes = sync.run_due_retries(&mut surface, &registry, Millis(150));
        assert_eq!(outcomes, vec![("zones".to_string(), SyncOutcome::Applied { set: 1, removed: 0 })]);
        assert_eq!(surface.feature_ids("zones"), vec![7]);
    }

    #[test]
    fn cancel_all_drops_pending_retries() {
        let registry = registry(zones());
        let mut surface = RecordingSurface::new();
        let mut sync = FeatureStateSync::default();
        sync.sync(&mut surface, &registry, job(&[1]), Millis(0));
        assert_eq!(sync.cancel_all(), 1);
        assert!(sync.run_due_retries(&mut surface, &registry, Millis(1_000)).is_empty());
    }
}
