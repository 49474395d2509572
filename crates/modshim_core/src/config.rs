//! Project configuration and the paths derived from it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Name of the project configuration file at the project root.
pub const CONFIG_FILE_NAME: &str = "modshim.yaml";

/// Environment variable that selects the active context.
pub const CONTEXT_ENV: &str = "MODSHIM_CONTEXT";

/// Contents of `modshim.yaml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Active context name
    pub context: String,
    /// Directory holding one sub-directory per context
    pub contexts_dir: PathBuf,
    /// Tool state: shims and extracted artifacts
    pub state_dir: PathBuf,
    /// Root of local modules
    pub terraform_dir: PathBuf,
    /// Root of override templates
    pub templates_dir: PathBuf,
    /// Extension of generated value files
    pub value_file_extension: String,
    /// Variables reserved for internal wiring
    pub protected_variables: Vec<String>,
    /// External initializer binary
    pub terraform_binary: String,
    /// Limit on one initializer run in seconds (0 = no limit)
    pub init_timeout_seconds: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            context: "local".to_string(),
            contexts_dir: PathBuf::from("contexts"),
            state_dir: PathBuf::from(".modshim"),
            terraform_dir: PathBuf::from("terraform"),
            templates_dir: PathBuf::from("contexts/_template/terraform"),
            value_file_extension: "tfvars".to_string(),
            protected_variables: vec![
                "context_path".to_string(),
                "os_type".to_string(),
                "context_id".to_string(),
            ],
            terraform_binary: "terraform".to_string(),
            init_timeout_seconds: 0,
        }
    }
}

impl ProjectConfig {
    /// Load `modshim.yaml` from a project root, falling back to defaults when absent.
    ///
    /// `MODSHIM_CONTEXT` overrides the configured context.
    pub fn load(project_root: &Path) -> CoreResult<Self> {
        let path = project_root.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            debug!("Loading project config from {:?}", path);
            let content = fs::read_to_string(&path).map_err(|source| CoreError::Read {
                path: path.clone(),
                source,
            })?;
            serde_yaml::from_str(&content).map_err(|e| CoreError::InvalidConfig {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            Self::default()
        };

        if let Ok(context) = std::env::var(CONTEXT_ENV) {
            if !context.is_empty() {
                config.context = context;
            }
        }

        config.validate(&path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> CoreResult<()> {
        if self.context.is_empty() || self.context.contains(['/', '\\']) {
            return Err(CoreError::InvalidConfig {
                path: path.to_path_buf(),
                message: format!("invalid context name '{}'", self.context),
            });
        }
        if self.value_file_extension.is_empty() {
            return Err(CoreError::InvalidConfig {
                path: path.to_path_buf(),
                message: "value_file_extension must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Resolves every path the generators read or write.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    config: ProjectConfig,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, config: ProjectConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Load the configuration found at `root`.
    pub fn discover(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        let config = ProjectConfig::load(&root)?;
        Ok(Self::new(root, config))
    }

    /// Switch the active context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.config.context = context.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn context_name(&self) -> &str {
        &self.config.context
    }

    pub fn context_dir(&self) -> PathBuf {
        self.root
            .join(&self.config.contexts_dir)
            .join(&self.config.context)
    }

    pub fn context_file(&self) -> PathBuf {
        self.context_dir().join("context.yaml")
    }

    pub fn blueprint_file(&self) -> PathBuf {
        self.context_dir().join("blueprint.yaml")
    }

    pub fn templates_root(&self) -> PathBuf {
        self.root.join(&self.config.templates_dir)
    }

    /// Directory of a generated shim module.
    pub fn shim_dir(&self, component_path: &str) -> PathBuf {
        join_component_path(
            &self.root.join(&self.config.state_dir).join(".tf_modules"),
            component_path,
        )
    }

    /// Isolated initializer state directory of a component.
    pub fn init_state_dir(&self, component_path: &str) -> PathBuf {
        join_component_path(&self.context_dir().join(".terraform"), component_path)
    }

    /// Root under which OCI artifacts are extracted, one directory per key.
    pub fn extraction_root(&self) -> PathBuf {
        self.root.join(&self.config.state_dir).join(".oci_extracted")
    }

    pub fn local_module_dir(&self, component_path: &str) -> PathBuf {
        join_component_path(&self.root.join(&self.config.terraform_dir), component_path)
    }

    /// Value file of a component: `<context>/terraform/<path>.<ext>`.
    pub fn value_file(&self, component_path: &str) -> PathBuf {
        let base = join_component_path(&self.context_dir().join("terraform"), component_path);
        let mut name = base.into_os_string();
        name.push(".");
        name.push(&self.config.value_file_extension);
        PathBuf::from(name)
    }

    /// Load the context data exposed to override templates.
    ///
    /// A missing `context.yaml` yields an empty object.
    pub fn load_context_values(&self) -> CoreResult<serde_json::Value> {
        let path = self.context_file();
        if !path.exists() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        let content = fs::read_to_string(&path).map_err(|source| CoreError::Read {
            path: path.clone(),
            source,
        })?;
        let yaml: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let json = match serde_json::to_value(yaml)? {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        if !json.is_object() {
            return Err(CoreError::InvalidConfig {
                path,
                message: "context data must be a mapping".to_string(),
            });
        }
        Ok(json)
    }
}

/// Join a slash-separated component path onto a base directory.
pub fn join_component_path(base: &Path, component_path: &str) -> PathBuf {
    component_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}
