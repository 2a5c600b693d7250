//! Response rows and the scalar conversions shared by filters, metadata
//! predicates and query building.

use serde_json::{Map, Value};
use tracing::debug;

/// One record of a data response or metadata table.
pub type Row = Map<String, Value>;

/// Envelope keys a data response may wrap its rows in, checked in order.
pub const ENVELOPE_KEYS: [&str; 4] = ["data", "rows", "result", "results"];

/// Flattens any supported response shape into rows.
///
/// Accepts a bare array or an object whose `data`, `rows`, `result` or
/// `results` field is an array. Scalar array items become `{"value": item}`.
/// Any other shape yields no rows.
pub fn normalize_rows(response: Value) -> Vec<Row> {
    let items = match response {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            let key = ENVELOPE_KEYS
                .iter()
                .find(|k| matches!(obj.get(**k), Some(Value::Array(_))));
            match key.and_then(|k| obj.remove(*k)) {
                Some(Value::Array(items)) => items,
                _ => {
                    debug!("response object has no row envelope");
                    return Vec::new();
                }
            }
        }
        Value::Null => return Vec::new(),
        other => {
            debug!(kind = value_kind(&other), "unsupported response shape");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            Value::Null => None,
            scalar => {
                let mut row = Row::new();
                row.insert("value".to_string(), scalar);
                Some(row)
            }
        })
        .collect()
}

/// String form of a scalar used for query strings and value comparison.
///
/// `null` has no string form. Arrays join their items with `,`.
pub fn param_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(param_string).collect();
            Some(parts.join(","))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

/// Numeric reading of a value, accepting numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Treats null, empty strings and empty arrays as "nothing selected".
pub fn is_empty_selection(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.iter().all(is_empty_selection),
        _ => false,
    }
}

/// Comparable keys for a selection; arrays contribute one key per item.
pub fn selection_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(param_string).collect(),
        other => param_string(other).into_iter().collect(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
