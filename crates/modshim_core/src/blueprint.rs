//! Default blueprint reader.
//!
//! The generation pipeline only needs an ordered component list and the named
//! sources; this reader supplies both from `<context>/blueprint.yaml`.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::component::{Component, Source, SourceRegistry};
use crate::config::ProjectLayout;
use crate::error::{CoreError, CoreResult};

/// Declared sources and terraform components of one context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub terraform: Vec<Component>,
}

impl Blueprint {
    /// Load and validate a blueprint file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::BlueprintNotFound(path.to_path_buf()));
        }
        debug!("Loading blueprint from {:?}", path);
        let content = fs::read_to_string(path).map_err(|source| CoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let blueprint: Blueprint =
            serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidConfig {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// Fill in the shim directory of components that do not declare one.
    pub fn with_default_paths(mut self, layout: &ProjectLayout) -> Self {
        for component in &mut self.terraform {
            if component.full_path.as_os_str().is_empty() {
                component.full_path = layout.shim_dir(&component.path);
            }
        }
        self
    }

    pub fn source_registry(&self) -> SourceRegistry {
        SourceRegistry::new(self.sources.iter().cloned())
    }

    fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for component in &self.terraform {
            let path = component.path.trim_matches('/');
            if path.is_empty() {
                return Err(CoreError::InvalidComponent {
                    component: component.path.clone(),
                    message: "path must not be empty".to_string(),
                });
            }
            if path.split('/').any(|segment| segment == "..") {
                return Err(CoreError::InvalidComponent {
                    component: component.path.clone(),
                    message: "path must not contain '..'".to_string(),
                });
            }
            if !seen.insert(path) {
                return Err(CoreError::InvalidComponent {
                    component: component.path.clone(),
                    message: "duplicate component path".to_string(),
                });
            }
        }
        Ok(())
    }
}
