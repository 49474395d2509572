//! # modshim_templates
//!
//! Per-component override values produced by templates.
//!
//! Templates live under a fixed root (by default
//! `contexts/_template/terraform`). A template at `cluster/talos.tera`
//! applies to the component with path `cluster/talos`. Each template is
//! rendered with [Tera](https://keats.github.io/tera/) against the active
//! context and must produce a JSON object; its entries override the
//! component's declared values.
//!
//! ## Example
//!
//! ```rust,no_run
//! use modshim_templates::load_overrides;
//! use serde_json::json;
//!
//! let overrides = load_overrides(
//!     "contexts/_template/terraform",
//!     "local",
//!     json!({"domain": "example.com"}),
//! )?;
//! for (component, values) in &overrides {
//!     println!("{}: {} override(s)", component, values.len());
//! }
//! # Ok::<(), modshim_templates::TemplateError>(())
//! ```

pub mod error;
pub mod loader;
pub mod renderer;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

pub use error::{TemplateError, TemplateResult};
pub use loader::{TemplateFile, TemplateLoader, TEMPLATE_EXTENSION};
pub use renderer::{OverrideValues, TemplateRenderer};

/// Override values keyed by component path.
pub type Overrides = BTreeMap<String, OverrideValues>;

/// Discover and evaluate every template under `root`.
///
/// A missing root yields no overrides. The first failing template aborts.
pub fn load_overrides(
    root: impl Into<PathBuf>,
    context_name: &str,
    context_values: serde_json::Value,
) -> TemplateResult<Overrides> {
    let loader = TemplateLoader::new(root);
    let templates = loader.discover()?;
    if templates.is_empty() {
        return Ok(Overrides::new());
    }

    let renderer = TemplateRenderer::new(context_name, context_values);
    let mut overrides = Overrides::new();
    for template in &templates {
        let values = renderer.render_file(template)?;
        overrides.insert(template.component_path.clone(), values);
    }

    info!(
        "Evaluated {} override template(s) from {:?}",
        overrides.len(),
        loader.root()
    );
    Ok(overrides)
}
