use std::collections::BTreeSet;

use formats::FilterConfig;

/// Lowercase ASCII slug: runs of anything non-alphanumeric collapse to `-`.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

pub fn base_filter_id(filter: &FilterConfig) -> String {
    if !filter.id.is_empty() {
        return filter.id.clone();
    }
    let name = slug(&filter.filter_name);
    let param = slug(&filter.param_name);
    match (name.is_empty(), param.is_empty()) {
        (true, true) => "filter".to_string(),
        (true, false) => param,
        (false, true) => name,
        (false, false) => format!("{name}-{param}"),
    }
}

/// Gives every filter a page-unique id.
///
/// Ids derive from filter name and param name; explicit ids are kept. A
/// collision gets `-2`, `-3`, ... in declaration order, so the same config
/// always yields the same ids.
pub fn assign_filter_ids(filters: &mut [FilterConfig]) {
    let mut used: BTreeSet<String> = BTreeSet::new();
    for filter in filters.iter_mut() {
        let base = base_filter_id(filter);
        let mut id = base.clone();
        let mut n = 2;
        while used.contains(&id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        used.insert(id.clone());
        filter.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{FilterType, FilterValues};
    use pretty_assertions::assert_eq;

    fn filter(name: &str, param: &str) -> FilterConfig {
        FilterConfig::new(name, param, FilterType::Dropdown, FilterValues::Local { values: vec![] })
    }

    #[test]
    fn slugs() {
        assert_eq!(slug("Scenario 1: Year"), "scenario-1-year");
        assert_eq!(slug("  --zoneTypeId--"), "zonetypeid");
        assert_eq!(slug("!!!"), "");
    }

    #[test]
    fn ids_are_deterministic_and_unique() {
        let mut filters = vec![
            filter("Year", "year"),
            filter("Year", "year"),
            filter("Mode", "mode"),
            filter("Year", "year"),
        ];
        let mut explicit = filter("Other", "x");
        explicit.id = "mode-mode".to_string();
        filters.push(explicit);

        assert_assigned(&mut filters, &["year-year", "year-year-2", "mode-mode", "year-year-3", "mode-mode-2"]);
    }

    #[test]
    fn empty_names_fall_back() {
        let mut filters = vec![filter("", ""), filter("", "zone"), filter("", "")];
        assert_assigned(&mut filters, &["filter", "zone", "filter-2"]);
    }

    fn assert_assigned(filters: &mut [FilterConfig], expected: &[&str]) {
        assign_filter_ids(filters);
        let ids: Vec<&str> = filters.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, expected);
    }
}
