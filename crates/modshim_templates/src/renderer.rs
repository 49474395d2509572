//! Template evaluation.

use std::collections::BTreeMap;
use std::error::Error as _;
use std::fs;

use modshim_core::Value;
use tera::{Context as TeraContext, Tera};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::loader::TemplateFile;

/// Override values for one component.
pub type OverrideValues = BTreeMap<String, Value>;

/// Evaluates override templates against the active context.
///
/// Each template sees one binding, `context`: the context data with a
/// `name` field set to the context name. The rendered text must be a JSON
/// object.
pub struct TemplateRenderer {
    context: TeraContext,
}

impl TemplateRenderer {
    pub fn new(context_name: &str, context_values: serde_json::Value) -> Self {
        let mut data = match context_values {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        data.insert(
            "name".to_string(),
            serde_json::Value::String(context_name.to_string()),
        );

        let mut context = TeraContext::new();
        context.insert("context", &data);
        Self { context }
    }

    /// Read and evaluate a discovered template file.
    pub fn render_file(&self, template: &TemplateFile) -> TemplateResult<OverrideValues> {
        let source = fs::read_to_string(&template.path).map_err(|source| TemplateError::Read {
            path: template.path.clone(),
            source,
        })?;
        self.render_str(&template.component_path, &source)
    }

    /// Evaluate template text; `name` identifies it in errors.
    pub fn render_str(&self, name: &str, source: &str) -> TemplateResult<OverrideValues> {
        let mut tera = Tera::default();
        let rendered = tera
            .render_str(source, &self.context)
            .map_err(|e| TemplateError::RenderingFailed {
                template: name.to_string(),
                message: describe_tera_error(&e),
            })?;
        debug!(template = %name, "Rendered override template");

        let output: serde_json::Value =
            serde_json::from_str(&rendered).map_err(|e| TemplateError::InvalidOutput {
                template: name.to_string(),
                message: e.to_string(),
            })?;

        match Value::from(output) {
            Value::Map(values) => Ok(values),
            other => Err(TemplateError::InvalidOutput {
                template: name.to_string(),
                message: format!("got {}", other.kind()),
            }),
        }
    }
}

/// Tera nests the useful detail in the source chain.
fn describe_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_binding_and_name() {
        let renderer = TemplateRenderer::new("prod", json!({"domain": "example.com"}));
        let values = renderer
            .render_str(
                "dns",
                r#"{"zone": "{{ context.domain }}", "env": "{{ context.name }}", "replicas": 3}"#,
            )
            .unwrap();

        assert_eq!(values["zone"], Value::from("example.com"));
        assert_eq!(values["env"], Value::from("prod"));
        assert_eq!(values["replicas"], Value::Int(3));
    }

    #[test]
    fn test_conditionals() {
        let renderer = TemplateRenderer::new("local", json!({"ha": false}));
        let values = renderer
            .render_str(
                "cluster",
                r#"{"nodes": {% if context.ha %}3{% else %}1{% endif %}}"#,
            )
            .unwrap();
        assert_eq!(values["nodes"], Value::Int(1));
    }

    #[test]
    fn test_non_object_output_is_rejected() {
        let renderer = TemplateRenderer::new("local", json!({}));
        let err = renderer.render_str("x", "[1, 2]").unwrap_err();
        assert!(matches!(err, TemplateError::InvalidOutput { .. }));
        assert!(err.to_string().contains('x'));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let renderer = TemplateRenderer::new("local", json!({}));
        assert!(matches!(
            renderer.render_str("x", "{not json"),
            Err(TemplateError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn test_render_error_names_template() {
        let renderer = TemplateRenderer::new("local", json!({}));
        let err = renderer
            .render_str("cluster/talos", "{{ context.missing.deep }}")
            .unwrap_err();
        assert!(matches!(err, TemplateError::RenderingFailed { .. }));
        assert!(err.to_string().contains("cluster/talos"));
    }
}
