use std::collections::BTreeMap;

use formats::FilterConfig;

pub const DEFAULT_GROUP: &str = "default";

/// Partitions filters into dependency groups.
///
/// A filter joins every group whose identifier appears in its `filterName`
/// (case-insensitive), so it may sit in several groups at once. Filters that
/// match no identifier land in [`DEFAULT_GROUP`]. Values are indices into
/// `filters`, in declaration order.
pub fn dependency_groups(
    filters: &[FilterConfig],
    identifiers: &[String],
) -> BTreeMap<String, Vec<usize>> {
    let lowered: Vec<(String, &String)> = identifiers
        .iter()
        .filter(|id| !id.is_empty())
        .map(|id| (id.to_lowercase(), id))
        .collect();

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, filter) in filters.iter().enumerate() {
        let name = filter.filter_name.to_lowercase();
        let mut matched = false;
        for (needle, identifier) in &lowered {
            if name.contains(needle.as_str()) {
                groups.entry((*identifier).clone()).or_default().push(idx);
                matched = true;
            }
        }
        if !matched {
            groups.entry(DEFAULT_GROUP.to_string()).or_default().push(idx);
        }
    }
    groups
}
