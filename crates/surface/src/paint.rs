use std::collections::{BTreeMap, BTreeSet};

use formats::{GeometryType, Style, StyleSuffix, param_string};
use serde_json::{Value, json};

/// Paint property name to value or expression.
pub type PaintSpec = BTreeMap<String, Value>;

pub const CONTINUOUS_RAMP: [&str; 7] = [
    "#f7fbff", "#deebf7", "#c6dbef", "#9ecae1", "#6baed6", "#3182bd", "#08519c",
];

pub const CATEGORICAL_PALETTE: [&str; 10] = [
    "#1b9e77", "#d95f02", "#7570b3", "#e7298a", "#66a61e", "#e6ab02", "#a6761d", "#666666",
    "#1f78b4", "#b2df8a",
];

pub const DIVERGING_NEGATIVE: &str = "#b2182b";
pub const DIVERGING_NEUTRAL: &str = "#f7f7f7";
pub const DIVERGING_POSITIVE: &str = "#2166ac";
pub const NO_DATA_COLOR: &str = "#cccccc";

const OPACITY: f64 = 0.8;

fn feature_value() -> Value {
    json!(["feature-state", "value"])
}

fn has_value() -> Value {
    json!(["!=", ["feature-state", "value"], null])
}

fn ramp_color(index: usize, count: usize) -> &'static str {
    let last = CONTINUOUS_RAMP.len() - 1;
    if count <= 1 {
        return CONTINUOUS_RAMP[last];
    }
    CONTINUOUS_RAMP[index * last / (count - 1)]
}

fn step_expression(breaks: &[f64]) -> Value {
    let stops: Vec<f64> = breaks
        .iter()
        .copied()
        .filter(|b| b.is_finite())
        .fold(Vec::new(), |mut acc, b| {
            if acc.last().is_none_or(|last| b > *last) {
                acc.push(b);
            }
            acc
        });
    let count = stops.len().max(1);
    let mut expr = vec![json!("step"), feature_value(), json!(ramp_color(0, count))];
    for (i, stop) in stops.iter().enumerate().skip(1) {
        expr.push(json!(stop));
        expr.push(json!(ramp_color(i, count)));
    }
    Value::Array(expr)
}

fn match_expression(categories: &[Value]) -> Value {
    let mut seen = BTreeSet::new();
    let labels: Vec<String> = categories
        .iter()
        .filter_map(param_string)
        .filter(|label| seen.insert(label.clone()))
        .collect();
    if labels.is_empty() {
        return json!(NO_DATA_COLOR);
    }
    let mut expr = vec![json!("match"), json!(["to-string", feature_value()])];
    for (i, label) in labels.into_iter().enumerate() {
        expr.push(json!(label));
        expr.push(json!(CATEGORICAL_PALETTE[i % CATEGORICAL_PALETTE.len()]));
    }
    expr.push(json!(NO_DATA_COLOR));
    Value::Array(expr)
}

fn diverging_extent(breaks: &[f64]) -> f64 {
    let extent = breaks
        .iter()
        .filter(|b| b.is_finite())
        .fold(0.0_f64, |acc, b| acc.max(b.abs()));
    if extent > 0.0 { extent } else { 1.0 }
}

/// Builds the data-driven paint for a joined layer.
///
/// Colours read the `value` feature state; features without state fall back
/// to [`NO_DATA_COLOR`] and are faded out. Diverging styles centre on zero and
/// scale opacity by `valueAbs`.
pub fn build_paint(
    geometry: GeometryType,
    style: &Style,
    breaks: &[f64],
    categories: &[Value],
) -> PaintSpec {
    let prefix = geometry.paint_prefix();
    let colour = match style.suffix {
        StyleSuffix::Continuous => step_expression(breaks),
        StyleSuffix::Categorical => match_expression(categories),
        StyleSuffix::Diverging => {
            let extent = diverging_extent(breaks);
            json!([
                "interpolate", ["linear"], feature_value(),
                -extent, DIVERGING_NEGATIVE,
                0, DIVERGING_NEUTRAL,
                extent, DIVERGING_POSITIVE
            ])
        }
    };
    let opacity = match style.suffix {
        StyleSuffix::Diverging => {
            let extent = diverging_extent(breaks);
            json!([
                "case", has_value(),
                ["interpolate", ["linear"], ["feature-state", "valueAbs"], 0, 0.3, extent, 0.9],
                0
            ])
        }
        _ => json!(["case", has_value(), OPACITY, 0]),
    };

    let mut paint = PaintSpec::new();
    paint.insert(
        format!("{prefix}-color"),
        json!(["case", has_value(), colour, NO_DATA_COLOR]),
    );
    paint.insert(format!("{prefix}-opacity"), opacity);
    paint
}
