use std::env;

use serde::{Deserialize, Serialize};

/// Timing and classification knobs for a [`crate::PageEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub fetch_debounce_ms: u64,
    pub viewport_debounce_ms: u64,
    pub retry_base_ms: u64,
    pub retry_max_attempts: u32,
    pub sample_size: usize,
    pub class_count: usize,
    pub group_identifiers: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fetch_debounce_ms: 300,
            viewport_debounce_ms: 500,
            retry_base_ms: surface::DEFAULT_RETRY_BASE_MS,
            retry_max_attempts: surface::DEFAULT_MAX_ATTEMPTS,
            sample_size: compute::sample::DEFAULT_SAMPLE_SIZE,
            class_count: compute::classify::DEFAULT_STD_DEV_CLASSES,
            group_identifiers: vec!["Scenario 1".to_string(), "Scenario 2".to_string()],
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `DASHBOARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`; unparsable values keep the current setting.
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let groups = lookup("DASHBOARD_GROUP_IDENTIFIERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(self.group_identifiers);
        Self {
            fetch_debounce_ms: parsed(&lookup, "DASHBOARD_FETCH_DEBOUNCE_MS", self.fetch_debounce_ms),
            viewport_debounce_ms: parsed(
                &lookup,
                "DASHBOARD_VIEWPORT_DEBOUNCE_MS",
                self.viewport_debounce_ms,
            ),
            retry_base_ms: parsed(&lookup, "DASHBOARD_RETRY_BASE_MS", self.retry_base_ms),
            retry_max_attempts: parsed(&lookup, "DASHBOARD_RETRY_MAX_ATTEMPTS", self.retry_max_attempts),
            sample_size: parsed(&lookup, "DASHBOARD_SAMPLE_SIZE", self.sample_size),
            class_count: parsed(&lookup, "DASHBOARD_CLASS_COUNT", self.class_count),
            group_identifiers: groups,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
