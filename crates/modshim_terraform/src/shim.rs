//! Shim module generation.
//!
//! A shim is a thin module in the state directory that wraps the resolved
//! module: every variable is passed through and every output re-exported.
//! Variable attributes are copied as expressions, never evaluated, so
//! complex defaults and type constraints survive unchanged.

use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Arc;

use hcl::expr::{Traversal, Variable};
use hcl::{Attribute, Block, Body, Expression};
use modshim_core::FileSystem;
use tracing::{debug, info};

use crate::error::{TerraformError, TerraformResult};
use crate::init::MAIN_MODULE;
use crate::variables::{read_body, OUTPUTS_FILE, VARIABLES_FILE};

/// Entry file of a shim.
pub const MAIN_FILE: &str = "main.tf";

const COPIED_VARIABLE_ATTRIBUTES: [&str; 5] =
    ["description", "type", "default", "sensitive", "nullable"];
const COPIED_OUTPUT_ATTRIBUTES: [&str; 2] = ["description", "sensitive"];

/// Files of a rendered shim, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct ShimFiles {
    pub main: String,
    pub variables: String,
    /// `None` when the wrapped module declares no outputs.
    pub outputs: Option<String>,
}

/// Renders and writes shim modules.
pub struct ShimGenerator {
    fs: Arc<dyn FileSystem>,
}

impl ShimGenerator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Render the shim for the module in `module_dir`.
    ///
    /// `module_source` becomes the `source` of the wrapped module block. A
    /// missing `variables.tf` is an error; a missing `outputs.tf` is not.
    pub fn render(&self, module_dir: &Path, module_source: &str) -> TerraformResult<ShimFiles> {
        let variables_path = module_dir.join(VARIABLES_FILE);
        if !self.fs.exists(&variables_path) {
            return Err(TerraformError::VariablesNotFound(variables_path));
        }
        let variables = read_body(self.fs.as_ref(), &variables_path)?;

        let outputs_path = module_dir.join(OUTPUTS_FILE);
        let outputs = if self.fs.exists(&outputs_path) {
            Some(read_body(self.fs.as_ref(), &outputs_path)?)
        } else {
            debug!("No outputs declared by {:?}", module_dir);
            None
        };

        let mut module = Block::builder("module")
            .add_label(MAIN_MODULE)
            .add_attribute(Attribute::new("source", module_source));
        let mut shim_variables = Body::builder();

        for block in named_blocks(&variables, "variable") {
            let name = block.labels()[0].as_str();
            module = module.add_attribute(Attribute::new(name, variable_ref(name)));
            shim_variables =
                shim_variables.add_block(copy_block(block, "variable", &COPIED_VARIABLE_ATTRIBUTES));
        }

        let main = hcl::to_string(&Body::builder().add_block(module.build()).build())?;
        let variables = hcl::to_string(&shim_variables.build())?;

        let outputs = match outputs {
            Some(body) => {
                let mut shim_outputs = Body::builder();
                for block in named_blocks(&body, "output") {
                    let name = block.labels()[0].as_str();
                    let value = module_output_ref(name);
                    let output = Block::builder("output")
                        .add_label(name)
                        .add_attribute(Attribute::new("value", value))
                        .add_attributes(copied_attributes(block, &COPIED_OUTPUT_ATTRIBUTES))
                        .build();
                    shim_outputs = shim_outputs.add_block(output);
                }
                Some(hcl::to_string(&shim_outputs.build())?)
            }
            None => None,
        };

        Ok(ShimFiles {
            main,
            variables,
            outputs,
        })
    }

    /// Render and write the shim into `shim_dir`.
    ///
    /// Everything is rendered before the first write, so a module that
    /// cannot be read leaves no shim behind.
    pub fn generate(
        &self,
        shim_dir: &Path,
        module_dir: &Path,
        module_source: &str,
    ) -> TerraformResult<ShimFiles> {
        let files = self.render(module_dir, module_source)?;

        self.write(&shim_dir.join(MAIN_FILE), &files.main)?;
        self.write(&shim_dir.join(VARIABLES_FILE), &files.variables)?;
        if let Some(outputs) = &files.outputs {
            self.write(&shim_dir.join(OUTPUTS_FILE), outputs)?;
        }

        info!("Generated shim in {:?}", shim_dir);
        Ok(files)
    }

    fn write(&self, path: &Path, content: &str) -> TerraformResult<()> {
        self.fs
            .write(path, content.as_bytes())
            .map_err(|source| TerraformError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Wrote {:?}", path);
        Ok(())
    }
}

/// Blocks of one kind that carry a name label.
fn named_blocks<'a>(body: &'a Body, kind: &'a str) -> impl Iterator<Item = &'a Block> + 'a {
    body.blocks()
        .filter(move |block| block.identifier() == kind && !block.labels().is_empty())
}

fn copy_block(block: &Block, kind: &str, keep: &[&str]) -> Block {
    Block::builder(kind)
        .add_label(block.labels()[0].as_str())
        .add_attributes(copied_attributes(block, keep))
        .build()
}

fn copied_attributes(block: &Block, keep: &[&str]) -> Vec<Attribute> {
    block
        .body()
        .attributes()
        .filter(|attribute| keep.contains(&attribute.key()))
        .cloned()
        .collect()
}

/// `var.<name>`
fn variable_ref(name: &str) -> Expression {
    Traversal::builder(Variable::unchecked("var"))
        .attr(name)
        .build()
        .into()
}

/// `module.main.<name>`
fn module_output_ref(name: &str) -> Expression {
    Traversal::builder(Variable::unchecked("module"))
        .attr(MAIN_MODULE)
        .attr(name)
        .build()
        .into()
}

/// `target` relative to `from_dir`, `/`-separated, for use as a module source.
///
/// Paths relative to the same directory are compared as they are. When only
/// one of them is absolute, both are anchored at the current directory first.
pub fn relative_source(from_dir: &Path, target: &Path) -> String {
    let (from_dir, target) = if from_dir.is_absolute() == target.is_absolute() {
        (normalize(from_dir), normalize(target))
    } else {
        (absolute(from_dir), absolute(target))
    };
    let from: Vec<PathComponent<'_>> = from_dir.components().collect();
    let to: Vec<PathComponent<'_>> = target.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for part in &to[common..] {
        relative.push(part.as_os_str());
    }

    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.first().is_some_and(|p| p == "..") {
        parts.join("/")
    } else {
        format!("./{}", parts.join("/"))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

/// Drop `.` segments and fold `..` into the preceding segment, without
/// touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<PathComponent<'_>> = Vec::new();
    for part in path.components() {
        match part {
            PathComponent::CurDir => {}
            PathComponent::ParentDir
                if matches!(parts.last(), Some(PathComponent::Normal(_))) =>
            {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use modshim_core::{MockFileSystem, OsFileSystem};
    use std::fs;
    use tempfile::tempdir;

    const MODULE_VARIABLES: &str = r#"
variable "name" {
  description = "Resource name"
  type        = string
}

variable "nodes" {
  type = map(object({
    size  = string
    count = number
  }))
  default = {
    pool = { size = "small", count = 1 }
  }
}

variable "token" {
  type      = string
  sensitive = true
  nullable  = false
}
"#;

    const MODULE_OUTPUTS: &str = r#"
output "id" {
  description = "Resource id"
  value       = aws_instance.this.id
}

output "secret" {
  value     = random_password.this.result
  sensitive = true
}
"#;

    fn module_dir(with_outputs: bool) -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(VARIABLES_FILE), MODULE_VARIABLES).unwrap();
        if with_outputs {
            fs::write(temp.path().join(OUTPUTS_FILE), MODULE_OUTPUTS).unwrap();
        }
        temp
    }

    fn generator() -> ShimGenerator {
        ShimGenerator::new(Arc::new(OsFileSystem))
    }

    #[test]
    fn test_main_passes_every_variable_through() {
        let module = module_dir(false);
        let files = generator().render(module.path(), "../x").unwrap();

        let body = hcl::parse(&files.main).unwrap();
        let block = body.blocks().next().unwrap();
        assert_eq!(block.identifier(), "module");
        assert_eq!(block.labels()[0].as_str(), "main");

        let keys: Vec<&str> = block.body().attributes().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["source", "name", "nodes", "token"]);
        assert!(files.main.contains("var.name"));
        assert!(files.main.contains("\"../x\""));
    }

    #[test]
    fn test_variables_copied_without_evaluation() {
        let module = module_dir(false);
        let files = generator().render(module.path(), "../x").unwrap();

        let body = hcl::parse(&files.variables).unwrap();
        let names: Vec<&str> = body
            .blocks()
            .map(|b| b.labels()[0].as_str())
            .collect();
        assert_eq!(names, vec!["name", "nodes", "token"]);

        let nodes = body.blocks().nth(1).unwrap();
        let keys: Vec<&str> = nodes.body().attributes().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["type", "default"]);
        assert!(files.variables.contains("map("));
        assert!(files.variables.contains("object("));

        let token = body.blocks().nth(2).unwrap();
        let keys: Vec<&str> = token.body().attributes().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["type", "sensitive", "nullable"]);
    }

    #[test]
    fn test_outputs_mirrored() {
        let module = module_dir(true);
        let files = generator().render(module.path(), "../x").unwrap();
        let outputs = files.outputs.unwrap();

        assert!(outputs.contains("module.main.id"));
        assert!(outputs.contains("module.main.secret"));
        assert!(outputs.contains("Resource id"));
        assert!(!outputs.contains("aws_instance"));

        let body = hcl::parse(&outputs).unwrap();
        let secret = body.blocks().nth(1).unwrap();
        let keys: Vec<&str> = secret.body().attributes().map(|a| a.key()).collect();
        assert_eq!(keys, vec!["value", "sensitive"]);
    }

    #[test]
    fn test_missing_outputs_is_fine() {
        let module = module_dir(false);
        let shim = tempdir().unwrap();
        let files = generator()
            .generate(shim.path(), module.path(), "../x")
            .unwrap();

        assert!(files.outputs.is_none());
        assert!(shim.path().join(MAIN_FILE).exists());
        assert!(shim.path().join(VARIABLES_FILE).exists());
        assert!(!shim.path().join(OUTPUTS_FILE).exists());
    }

    #[test]
    fn test_missing_variables_writes_nothing() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().returning(|_| false);
        fs.expect_write().never();

        let err = ShimGenerator::new(Arc::new(fs))
            .generate(Path::new("shim"), Path::new("module"), "../x")
            .unwrap_err();
        assert!(matches!(err, TerraformError::VariablesNotFound(_)));
        assert!(err.to_string().contains("variables.tf"));
    }

    #[test]
    fn test_passthrough_expressions_are_traversals() {
        let module = module_dir(true);
        let files = generator().render(module.path(), "../x").unwrap();

        let main = hcl::parse(&files.main).unwrap();
        let block = main.blocks().next().unwrap();
        let name = block
            .body()
            .attributes()
            .find(|a| a.key() == "name")
            .unwrap();
        assert!(matches!(name.expr(), Expression::Traversal(_)));
        assert_eq!(name.expr(), &variable_ref("name"));

        let outputs = hcl::parse(files.outputs.as_deref().unwrap()).unwrap();
        let id = outputs.blocks().next().unwrap();
        let value = id.body().attributes().find(|a| a.key() == "value").unwrap();
        assert_eq!(value.expr(), &module_output_ref("id"));
    }

    #[test]
    fn test_relative_source_mixed_bases() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(
            relative_source(
                Path::new(".modshim/.tf_modules/a"),
                &cwd.join(".modshim/.oci_extracted/k")
            ),
            "../../.oci_extracted/k"
        );
        assert_eq!(
            relative_source(&cwd.join("shim"), Path::new("./mods/x")),
            "../mods/x"
        );
        assert_eq!(relative_source(Path::new("./p/./a"), Path::new("p/b")), "../b");
    }

    #[test]
    fn test_relative_source() {
        assert_eq!(
            relative_source(
                Path::new("/p/.modshim/.tf_modules/net/vpc"),
                Path::new("/p/.modshim/.oci_extracted/k/terraform/net/vpc")
            ),
            "../../../.oci_extracted/k/terraform/net/vpc"
        );
        assert_eq!(
            relative_source(Path::new("/p/a"), Path::new("/p/a/b")),
            "./b"
        );
    }
}
