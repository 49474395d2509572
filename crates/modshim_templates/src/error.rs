//! Error types for override templates.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while discovering or evaluating templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template directory {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template rendering failed for {template}: {message}")]
    RenderingFailed { template: String, message: String },

    #[error("Template {template} did not produce a JSON object: {message}")]
    InvalidOutput { template: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
