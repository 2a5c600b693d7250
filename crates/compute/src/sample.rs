use formats::{Row, value_as_f64};
use serde_json::Value;

pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Deterministic bounded sample: at most `max` items taken at an even stride,
/// always starting with the first item.
pub fn evenly_spaced<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    if max == 0 {
        return Vec::new();
    }
    if items.len() <= max {
        return items.to_vec();
    }
    (0..max).map(|i| items[i * items.len() / max].clone()).collect()
}

/// Values of `field` across `rows`; rows without the field contribute `null`.
pub fn column(rows: &[Row], field: &str) -> Vec<Value> {
    rows.iter()
        .map(|row| row.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Numeric readings of `values`, skipping anything non-numeric.
pub fn numeric(values: &[Value]) -> Vec<f64> {
    values.iter().filter_map(value_as_f64).collect()
}
