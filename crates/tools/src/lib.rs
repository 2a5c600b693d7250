//! Command implementations behind the `dashboard` binary.
//!
//! Each command returns its output as a value so it can be tested without a
//! terminal; `main.rs` only parses arguments and prints.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use compute::sample::{column, numeric};
use compute::{ClassificationResult, classify, determine_dynamic_style};
use filters::assign_filter_ids;
use formats::{ClassificationMethod, PageConfig, Row, Style, load_page_config, normalize_rows};
use layers::{replace_route_parameter, route_parameters};
use page::{EngineSettings, FileDataSource, PageEngine};
use runtime::Millis;
use serde::Serialize;
use serde_json::Value;
use surface::{RecordingSurface, SurfaceCall};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub layers: Vec<String>,
    pub templated_layers: BTreeMap<String, Vec<String>>,
    pub visualisations: Vec<String>,
    pub metadata_tables: Vec<String>,
    pub filter_ids: Vec<String>,
}

pub fn summarize_page(config: &PageConfig) -> PageSummary {
    let mut filters = config.filters.clone();
    assign_filter_ids(&mut filters);
    PageSummary {
        layers: config.layers.iter().map(|l| l.name.clone()).collect(),
        templated_layers: config
            .layers
            .iter()
            .filter_map(|l| {
                let params: Vec<String> = route_parameters(l.template())
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                (!params.is_empty()).then(|| (l.name.clone(), params))
            })
            .collect(),
        visualisations: config.visualisations.iter().map(|v| v.name.clone()).collect(),
        metadata_tables: config.metadata_tables.iter().map(|t| t.name.clone()).collect(),
        filter_ids: filters.into_iter().map(|f| f.id).collect(),
    }
}

pub fn validate(path: &Path) -> Result<PageSummary, String> {
    let config = load_page_config(path).map_err(|e| e.to_string())?;
    Ok(summarize_page(&config))
}

pub fn parse_method(raw: &str) -> Result<ClassificationMethod, String> {
    serde_json::from_value(Value::String(raw.to_string()))
        .map_err(|_| format!("unknown method {raw:?} (jenks, standardDeviation, headTail)"))
}

/// Reads a JSON file of values: a bare array, or rows (optionally in an
/// envelope) from which `field` is taken.
pub fn read_values(path: &Path, field: &str) -> Result<Vec<Value>, String> {
    let payload = fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let body: Value = serde_json::from_str(&payload).map_err(|e| format!("{}: {e}", path.display()))?;
    let rows: Vec<Row> = normalize_rows(body);
    Ok(column(&rows, field))
}

pub fn classify_values(values: &[Value], method: ClassificationMethod, classes: usize) -> ClassificationResult {
    classify(method, &numeric(values), classes)
}

pub fn style_for(values: &[Value], base: &str) -> Style {
    determine_dynamic_style(Some(values), base)
}

/// `name=value` pairs; values are read as JSON when they parse, else as text.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))?;
    if name.is_empty() {
        return Err(format!("empty name in {raw:?}"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

pub fn resolve(template: &str, assignments: &[(String, Value)]) -> Result<String, String> {
    let mut path = template.to_string();
    for (name, value) in assignments {
        path = replace_route_parameter(&path, name, value).map_err(|e| e.to_string())?;
    }
    Ok(path)
}

/// Runs one load and fetch cycle of `page` against files under `data_dir`
/// and returns every call made to the render surface.
pub async fn simulate(
    page: &Path,
    data_dir: &Path,
    settings: EngineSettings,
    selections: &[(String, Value)],
) -> Result<Vec<SurfaceCall>, String> {
    let config = load_page_config(page).map_err(|e| e.to_string())?;
    let step = settings.fetch_debounce_ms;
    let retry = settings.retry_base_ms;
    let attempts = u64::from(settings.retry_max_attempts);
    let mut engine = PageEngine::new(settings, RecordingSurface::new(), FileDataSource::new(data_dir));

    let mut now = Millis::ZERO;
    engine.load(config, now).await;
    engine.map_loaded(now);
    for (id, value) in selections {
        engine.set_filter_value(id, value.clone(), now);
    }
    now = now.after(step);
    engine.advance(now).await;
    for attempt in 1..attempts {
        now = now.after(retry.saturating_mul(attempt));
        engine.advance(now).await;
    }
    info!(
        calls = engine.surface().calls().len(),
        counters = ?engine.metrics().counters(),
        "simulation finished"
    );
    Ok(engine.surface_mut().take_calls())
}
