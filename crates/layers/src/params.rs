//! `{name}` placeholders in layer paths.
//!
//! `{z}`, `{x}` and `{y}` are tile coordinates filled in by the renderer and
//! are never treated as route parameters.

use formats::{LayerConfig, param_string};
use serde_json::Value;

pub const TILE_TOKENS: [&str; 3] = ["z", "x", "y"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    NullValue { name: String },
    UnsupportedValue { name: String },
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamError::NullValue { name } => {
                write!(f, "route parameter {name:?} has no value yet")
            }
            ParamError::UnsupportedValue { name } => {
                write!(f, "route parameter {name:?} must be a scalar or list")
            }
        }
    }
}

impl std::error::Error for ParamError {}

/// Byte ranges and names of every `{name}` token in `path`, tile tokens excluded.
fn tokens(path: &str) -> Vec<(usize, usize, &str)> {
    let mut out = Vec::new();
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i + 1;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'}' && j > start + 1 {
            let name = &path[start + 1..j];
            if !TILE_TOKENS.contains(&name) {
                out.push((start, j + 1, name));
            }
            i = j + 1;
        } else {
            i = start + 1;
        }
    }
    out
}

pub fn has_route_parameter(path: &str) -> bool {
    !tokens(path).is_empty()
}

/// Name of the first route parameter in `path`.
pub fn extract_param_name(path: &str) -> Option<&str> {
    tokens(path).first().map(|(_, _, name)| *name)
}

/// Distinct route parameter names in order of first appearance.
pub fn route_parameters(path: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for (_, _, name) in tokens(path) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Substitutes every `{name}` in `path` with the URL-safe form of `value`.
///
/// Other tokens are left in place. `null` is rejected: callers must wait for
/// the driving filter to have a value.
pub fn replace_route_parameter(path: &str, name: &str, value: &Value) -> Result<String, ParamError> {
    let raw = raw_value(name, value)?;
    Ok(substitute(path, name, &encode_path_segment(&raw)))
}

fn raw_value(name: &str, value: &Value) -> Result<String, ParamError> {
    match value {
        Value::Null => Err(ParamError::NullValue {
            name: name.to_string(),
        }),
        Value::Object(_) => Err(ParamError::UnsupportedValue {
            name: name.to_string(),
        }),
        other => Ok(param_string(other).unwrap_or_default()),
    }
}

fn substitute(path: &str, name: &str, encoded: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut last = 0;
    for (start, end, token) in tokens(path) {
        if token != name {
            continue;
        }
        out.push_str(&path[last..start]);
        out.push_str(encoded);
        last = end;
    }
    out.push_str(&path[last..]);
    out
}

/// Percent-encodes everything outside RFC 3986 unreserved characters and `,`.
pub fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b',') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Records `name = value` on the layer and recomputes its path from the
/// template, keeping values recorded for other tokens.
///
/// Returns `Ok(true)` when the path changed.
pub fn apply_layer_param(layer: &mut LayerConfig, name: &str, value: &Value) -> Result<bool, ParamError> {
    let raw = raw_value(name, value)?;

    let template = layer.template().to_string();
    layer.path_params.insert(name.to_string(), raw);

    let mut path = template.clone();
    for (param, raw) in &layer.path_params {
        path = substitute(&path, param, &encode_path_segment(raw));
    }

    layer.path_template = Some(template);
    let changed = layer.path != path;
    layer.path = path;
    Ok(changed)
}

/// Route parameters of the layer's template that have no recorded value.
pub fn unresolved_params(layer: &LayerConfig) -> Vec<String> {
    route_parameters(layer.template())
        .into_iter()
        .filter(|name| !layer.path_params.contains_key(*name))
        .map(str::to_string)
        .collect()
}
