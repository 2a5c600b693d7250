use std::collections::BTreeMap;

pub const FETCH_OK: &str = "fetch.ok";
pub const FETCH_FAILED: &str = "fetch.failed";
pub const FETCH_SKIPPED: &str = "fetch.skipped";
pub const FETCH_ROWS: &str = "fetch.rows";
pub const SYNC_SET: &str = "sync.feature_state.set";
pub const SYNC_REMOVED: &str = "sync.feature_state.removed";
pub const SYNC_RETRY: &str = "sync.retry";
pub const SYNC_GAVE_UP: &str = "sync.gave_up";

/// Engine counters and row-count histograms.
///
/// Sorted maps keep snapshots stable so they can be asserted on directly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<String, u64>,
    histograms: BTreeMap<String, Histogram>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Histogram {
    pub count: u64,
    pub sum: u64,
    pub min: u64,
    pub max: u64,
}

impl Histogram {
    pub fn record(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &str) {
        self.inc_by(name, 1);
    }

    pub fn inc_by(&mut self, name: &str, by: u64) {
        if by == 0 {
            return;
        }
        *self.counters.entry(name.to_string()).or_insert(0) += by;
    }

    pub fn record(&mut self, name: &str, value: u64) {
        self.histograms
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        self.histograms.get(name).copied()
    }

    /// Counters in name order, for logs and the CLI.
    pub fn counters(&self) -> Vec<(String, u64)> {
        self.counters.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}
