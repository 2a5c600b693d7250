use std::collections::{BTreeMap, BTreeSet};

use formats::{FilterConfig, FilterOption, FilterValues, MetadataTable, param_string};
use serde_json::Value;
use tracing::warn;

fn option_key(option: &FilterOption) -> (String, String) {
    (
        option.display_value.clone(),
        param_string(&option.param_value).unwrap_or_default(),
    )
}

/// Drops repeated `(displayValue, paramValue)` pairs, keeping the first.
pub fn dedup_options(options: Vec<FilterOption>) -> Vec<FilterOption> {
    let mut seen = BTreeSet::new();
    options
        .into_iter()
        .filter(|option| seen.insert(option_key(option)))
        .collect()
}

/// Projects a metadata table onto filter options in first-seen order.
///
/// Rows without a param value are skipped; a missing display value falls back
/// to the param value.
pub fn options_from_table(
    table: &MetadataTable,
    display_column: &str,
    param_column: &str,
) -> Vec<FilterOption> {
    let options = table
        .rows
        .iter()
        .filter_map(|row| {
            let param = row.get(param_column).filter(|v| !v.is_null())?.clone();
            let display = row
                .get(display_column)
                .and_then(param_string)
                .or_else(|| param_string(&param))
                .unwrap_or_default();
            Some(FilterOption::new(display, param))
        })
        .collect();
    dedup_options(options)
}

/// Fills option lists: metadata-sourced filters from their tables, local
/// filters de-duplicated in place.
pub fn populate_options(filters: &mut [FilterConfig], tables: &BTreeMap<String, MetadataTable>) {
    for filter in filters.iter_mut() {
        match &mut filter.values {
            FilterValues::Local { values } => {
                *values = dedup_options(std::mem::take(values));
            }
            FilterValues::MetadataTable {
                metadata_table_name,
                display_column,
                param_column,
                values,
            } => match tables.get(metadata_table_name.as_str()) {
                Some(table) => *values = options_from_table(table, display_column, param_column),
                None => {
                    warn!(filter = %filter.filter_name, table = %metadata_table_name, "metadata table missing");
                    values.clear();
                }
            },
        }
    }
}

/// The default selection for a filter: its configured default, else nothing.
pub fn default_selection(filter: &FilterConfig) -> Value {
    filter.default_value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{FilterType, Row};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(v: Value) -> Vec<Row> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn projects_unique_options_in_first_seen_order() {
        let table = MetadataTable::new(
            "modes",
            rows(json!([
                {"label": "Bus", "code": "bus"},
                {"label": "Rail", "code": "rail"},
                {"label": "Bus", "code": "bus"},
                {"code": 7},
                {"label": "Orphan"}
            ])),
        );
        let options = options_from_table(&table, "label", "code");
        let pairs: Vec<(String, Value)> = options
            .into_iter()
            .map(|o| (o.display_value, o.param_value))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Bus".to_string(), json!("bus")),
                ("Rail".to_string(), json!("rail")),
                ("7".to_string(), json!(7)),
            ]
        );
    }

    #[test]
    fn populates_both_sources() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "modes".to_string(),
            MetadataTable::new("modes", rows(json!([{"label": "Bus", "code": "bus"}]))),
        );
        let mut filters = vec![
            FilterConfig::new(
                "Mode",
                "mode",
                FilterType::Dropdown,
                FilterValues::MetadataTable {
                    metadata_table_name: "modes".to_string(),
                    display_column: "label".to_string(),
                    param_column: "code".to_string(),
                    values: vec![],
                },
            ),
            FilterConfig::new(
                "Flag",
                "flag",
                FilterType::Toggle,
                FilterValues::Local {
                    values: vec![
                        FilterOption::new("On", json!(true)),
                        FilterOption::new("On", json!(true)),
                    ],
                },
            ),
            FilterConfig::new(
                "Gone",
                "gone",
                FilterType::Dropdown,
                FilterValues::MetadataTable {
                    metadata_table_name: "missing".to_string(),
                    display_column: "a".to_string(),
                    param_column: "b".to_string(),
                    values: vec![FilterOption::new("stale", json!(1))],
                },
            ),
        ];
        populate_options(&mut filters, &tables);
        assert_eq!(filters[0].options().len(), 1);
        assert_eq!(filters[1].options().len(), 1);
        assert!(filters[2].options().is_empty());
    }
}
