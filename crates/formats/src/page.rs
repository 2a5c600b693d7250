use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::filter::FilterConfig;
use crate::layer::LayerConfig;
use crate::metadata::MetadataTableConfig;
use crate::visualisation::VisualisationConfig;

/// Everything one dashboard page declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub visualisations: Vec<VisualisationConfig>,
    #[serde(default)]
    pub metadata_tables: Vec<MetadataTableConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

#[derive(Debug)]
pub enum PageConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    DuplicateLayer(String),
    UnknownJoinLayer {
        visualisation: String,
        layer: String,
    },
}

impl std::fmt::Display for PageConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageConfigError::Io { path, source } => {
                write!(f, "failed to read page config {}: {source}", path.display())
            }
            PageConfigError::Parse(e) => write!(f, "invalid page config: {e}"),
            PageConfigError::DuplicateLayer(name) => {
                write!(f, "layer {name:?} is declared more than once")
            }
            PageConfigError::UnknownJoinLayer {
                visualisation,
                layer,
            } => write!(
                f,
                "visualisation {visualisation:?} joins unknown layer {layer:?}"
            ),
        }
    }
}

impl std::error::Error for PageConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageConfigError::Io { source, .. } => Some(source),
            PageConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl PageConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, PageConfigError> {
        let config: PageConfig = serde_json::from_str(payload).map_err(PageConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross references that serde cannot express.
    pub fn validate(&self) -> Result<(), PageConfigError> {
        let mut names = BTreeSet::new();
        for layer in &self.layers {
            if !names.insert(layer.name.as_str()) {
                return Err(PageConfigError::DuplicateLayer(layer.name.clone()));
            }
        }
        for vis in &self.visualisations {
            if let Some(join) = &vis.join_layer
                && !names.contains(join.as_str())
            {
                return Err(PageConfigError::UnknownJoinLayer {
                    visualisation: vis.name.clone(),
                    layer: join.clone(),
                });
            }
        }
        Ok(())
    }
}

pub fn load_page_config(path: impl AsRef<Path>) -> Result<PageConfig, PageConfigError> {
    let path = path.as_ref();
    let payload = fs::read_to_string(path).map_err(|e| PageConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    PageConfig::from_json_str(&payload)
}
