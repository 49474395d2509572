//! Template discovery.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};

/// File extension of override templates.
pub const TEMPLATE_EXTENSION: &str = "tera";

/// One override template and the component it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    /// Component path: location under the root, without extension, `/`-separated.
    pub component_path: String,
    /// File on disk.
    pub path: PathBuf,
}

/// Finds override templates below a root directory.
pub struct TemplateLoader {
    root: PathBuf,
}

impl TemplateLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root depth-first and return every `.tera` file.
    ///
    /// Uses an explicit stack, so nesting depth does not grow the call stack.
    /// A missing root yields no templates. Symlinks are not followed.
    pub fn discover(&self) -> TemplateResult<Vec<TemplateFile>> {
        if !self.root.is_dir() {
            debug!("No template directory at {:?}", self.root);
            return Ok(Vec::new());
        }

        let mut templates = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .and_then(|rd| rd.collect::<Result<Vec<_>, _>>())
                .map_err(|source| TemplateError::Discovery {
                    path: dir.clone(),
                    source,
                })?;
            entries.sort_by_key(|e| e.file_name());

            let mut subdirs = Vec::new();
            for entry in entries {
                let path = entry.path();
                let file_type = entry.file_type().map_err(|source| TemplateError::Discovery {
                    path: path.clone(),
                    source,
                })?;

                if file_type.is_dir() {
                    subdirs.push(path);
                } else if file_type.is_file() && is_template(&path) {
                    match self.component_path(&path) {
                        Some(component_path) => templates.push(TemplateFile {
                            component_path,
                            path,
                        }),
                        None => warn!("Ignoring template with non UTF-8 path {:?}", path),
                    }
                }
            }

            // Reverse so the lexically first directory is visited first.
            pending.extend(subdirs.into_iter().rev());
        }

        debug!("Discovered {} override template(s)", templates.len());
        Ok(templates)
    }

    fn component_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(segments.join("/"))
    }
}

fn is_template(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMPLATE_EXTENSION)
}
