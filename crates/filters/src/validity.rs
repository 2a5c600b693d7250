use std::collections::{BTreeMap, BTreeSet};

use formats::{FilterConfig, MetadataTable, is_empty_selection, param_string, selection_keys};
use tracing::{debug, warn};

use crate::groups::dependency_groups;
use crate::state::FilterState;

struct MetadataFilter<'a> {
    table: &'a str,
    param_column: &'a str,
}

fn metadata_filter(filter: &FilterConfig) -> Option<MetadataFilter<'_>> {
    let (table, param_column) = filter.metadata_source()?;
    Some(MetadataFilter { table, param_column })
}

fn selected_keys(filter: &FilterConfig, state: &FilterState) -> Option<BTreeSet<String>> {
    let value = state.get(&filter.id)?;
    if is_empty_selection(value) {
        return None;
    }
    Some(selection_keys(value).into_iter().collect())
}

/// Recomputes option validity for every metadata-sourced filter.
///
/// Each filter starts from the full set of values in its table's param
/// column. Inside a dependency group, a `shouldFilterOthers` filter with a
/// selection narrows every other `shouldBeFiltered` filter on the same table
/// to the values seen in the rows matching that selection. Narrowing is
/// computed from table rows, never from another filter's narrowed set, so it
/// does not chain across filters.
///
/// Returns updated copies in declaration order; local filters are omitted.
pub fn update_filter_validity(
    filters: &[FilterConfig],
    tables: &BTreeMap<String, MetadataTable>,
    state: &FilterState,
    identifiers: &[String],
) -> Vec<FilterConfig> {
    let mut valid: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    for (idx, filter) in filters.iter().enumerate() {
        let Some(source) = metadata_filter(filter) else {
            continue;
        };
        let keys = match tables.get(source.table) {
            Some(table) => table.column_keys(source.param_column),
            None => {
                warn!(filter = %filter.id, table = source.table, "metadata table missing, no valid values");
                BTreeSet::new()
            }
        };
        valid.insert(idx, keys);
    }

    for (group, members) in dependency_groups(filters, identifiers) {
        for &driver_idx in &members {
            let driver = &filters[driver_idx];
            if !driver.should_filter_others {
                continue;
            }
            let Some(source) = metadata_filter(driver) else {
                continue;
            };
            let Some(selection) = selected_keys(driver, state) else {
                continue;
            };
            let Some(table) = tables.get(source.table) else {
                continue;
            };
            let matching: Vec<_> = table
                .rows_matching(source.param_column, &selection)
                .collect();

            for &target_idx in &members {
                if target_idx == driver_idx {
                    continue;
                }
                let target = &filters[target_idx];
                if !target.should_be_filtered {
                    continue;
                }
                let Some(target_source) = metadata_filter(target) else {
                    continue;
                };
                if target_source.table != source.table {
                    continue;
                }
                let observed: BTreeSet<String> = matching
                    .iter()
                    .filter_map(|row| row.get(target_source.param_column).and_then(param_string))
                    .collect();
                if let Some(keys) = valid.get_mut(&target_idx) {
                    keys.retain(|k| observed.contains(k));
                    debug!(
                        group = %group,
                        driver = %driver.id,
                        target = %target.id,
                        remaining = keys.len(),
                        "narrowed filter options"
                    );
                }
            }
        }
    }

    valid
        .into_iter()
        .map(|(idx, keys)| {
            let mut filter = filters[idx].clone();
            let validated = filter.should_be_validated;
            let hides = filter.should_filter_on_validation || filter.should_be_filtered;
            for option in filter.values.options_mut() {
                let ok = param_string(&option.param_value).is_some_and(|k| keys.contains(&k));
                option.is_valid = validated.then_some(ok);
                if hides {
                    option.is_hidden = Some(!ok);
                }
            }
            filter
        })
        .collect()
}
