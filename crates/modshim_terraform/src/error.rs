//! Error types for module resolution and generation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Terraform generation.
pub type TerraformResult<T> = Result<T, TerraformError>;

/// Errors that can occur while resolving modules or writing generated files.
#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Variable file not found: {0}")]
    VariablesNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Existing value file {path} cannot be read: {source}")]
    UnreadableValueFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("terraform init failed for {source_ref}: {message}")]
    InitFailed { source_ref: String, message: String },

    #[error("HCL error: {0}")]
    Hcl(#[from] hcl::Error),

    #[error("Component {component}: {source}")]
    Component {
        component: String,
        #[source]
        source: Box<TerraformError>,
    },

    #[error(transparent)]
    Core(#[from] modshim_core::CoreError),

    #[error(transparent)]
    Oci(#[from] modshim_oci::OciError),

    #[error(transparent)]
    Template(#[from] modshim_templates::TemplateError),

    #[error(transparent)]
    Runner(#[from] modshim_runner::RunnerError),
}

impl TerraformError {
    /// Attach the component path to an error.
    pub fn for_component(component: impl Into<String>, source: TerraformError) -> Self {
        TerraformError::Component {
            component: component.into(),
            source: Box::new(source),
        }
    }

    /// The error beneath any component wrapper.
    pub fn root(&self) -> &TerraformError {
        match self {
            TerraformError::Component { source, .. } => source.root(),
            other => other,
        }
    }
}
