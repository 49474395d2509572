//! Error types for OCI operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for OCI operations.
pub type OciResult<T> = Result<T, OciError>;

/// Errors that can occur while pulling or extracting artifacts.
#[derive(Error, Debug)]
pub enum OciError {
    #[error("Invalid OCI reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("OCI artifact {0} not found in cache")]
    NotInCache(String),

    #[error("Registry error for {reference}: {message}")]
    Registry { reference: String, message: String },

    #[error("Unsafe path in artifact: {entry}")]
    PathTraversal { entry: String },

    #[error("Failed to extract artifact into {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
