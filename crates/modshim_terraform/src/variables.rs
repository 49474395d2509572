//! Variable metadata parsing.
//!
//! Reads `variable` blocks from a module's `variables.tf`. Only literal
//! values are extracted: a description that is not a plain string, a
//! `sensitive` flag that is not a plain bool, or a default that does not
//! evaluate without context are treated as absent.

use std::collections::BTreeMap;
use std::path::Path;

use hcl::eval::{Context, Evaluate};
use hcl::{Body, Expression};
use modshim_core::{FileSystem, Value, VariableInfo};
use tracing::debug;

use crate::error::{TerraformError, TerraformResult};

/// File holding a module's variable declarations.
pub const VARIABLES_FILE: &str = "variables.tf";

/// File holding a module's output declarations.
pub const OUTPUTS_FILE: &str = "outputs.tf";

/// Read and parse an HCL file through the filesystem port.
pub(crate) fn read_body(fs: &dyn FileSystem, path: &Path) -> TerraformResult<Body> {
    let content = fs.read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            TerraformError::VariablesNotFound(path.to_path_buf())
        } else {
            TerraformError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    hcl::parse(&content).map_err(|e| TerraformError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse the variable declarations in `path`, skipping `protected` names.
pub fn parse_variables(
    fs: &dyn FileSystem,
    path: &Path,
    protected: &[String],
) -> TerraformResult<Vec<VariableInfo>> {
    let body = read_body(fs, path)?;
    let variables = variables_from_body(&body, protected);
    debug!("Parsed {} variable(s) from {:?}", variables.len(), path);
    Ok(variables)
}

/// Parse variable declarations from HCL source text.
pub fn parse_variables_str(content: &str, protected: &[String]) -> TerraformResult<Vec<VariableInfo>> {
    let body = hcl::parse(content)?;
    Ok(variables_from_body(&body, protected))
}

fn variables_from_body(body: &Body, protected: &[String]) -> Vec<VariableInfo> {
    body.blocks()
        .filter(|block| block.identifier() == "variable")
        .filter_map(|block| {
            let name = block.labels().first()?.as_str();
            if protected.iter().any(|p| p == name) {
                return None;
            }

            let mut variable = VariableInfo::new(name);
            for attribute in block.body().attributes() {
                match (attribute.key(), attribute.expr()) {
                    ("description", Expression::String(text)) => {
                        variable.description = Some(text.clone());
                    }
                    ("sensitive", Expression::Bool(flag)) => {
                        variable.sensitive = *flag;
                    }
                    ("default", expr) => {
                        variable.default = literal_default(name, expr);
                    }
                    _ => {}
                }
            }
            Some(variable)
        })
        .collect()
}

/// Evaluate a default without variables or functions; `null` counts as absent.
fn literal_default(name: &str, expr: &Expression) -> Option<Value> {
    match expr.evaluate(&Context::new()) {
        Ok(hcl::Value::Null) => None,
        Ok(value) => Some(from_hcl(value)),
        Err(e) => {
            debug!("Default of {} is not a literal: {}", name, e);
            None
        }
    }
}

fn from_hcl(value: hcl::Value) -> Value {
    match value {
        hcl::Value::Null => Value::Null,
        hcl::Value::Bool(b) => Value::Bool(b),
        hcl::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        hcl::Value::String(s) => Value::String(s),
        hcl::Value::Array(items) => Value::List(items.into_iter().map(from_hcl).collect()),
        hcl::Value::Object(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, from_hcl(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}
