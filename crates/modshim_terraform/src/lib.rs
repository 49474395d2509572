//! # modshim_terraform
//!
//! Module resolution and file generation for modshim.
//!
//! Given the components of a blueprint, this crate:
//!
//! - resolves each module to a directory on disk (local, OCI artifact, or
//!   remote source fetched with `terraform init`)
//! - writes a shim module that forwards every variable and output to the
//!   resolved module
//! - reads the module's variable declarations
//! - synthesizes a value file, leaving existing files alone
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use modshim_core::{Blueprint, OsFileSystem, ProjectLayout};
//! use modshim_oci::RegistryPuller;
//! use modshim_runner::SystemRunner;
//! use modshim_terraform::{GenerateOptions, Generator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = ProjectLayout::discover(".")?;
//! let blueprint = Blueprint::load(&layout.blueprint_file())?.with_default_paths(&layout);
//!
//! let generator = Generator::new(
//!     layout,
//!     Arc::new(OsFileSystem),
//!     Arc::new(SystemRunner::new()),
//!     Arc::new(RegistryPuller::from_env()),
//! );
//! let report = generator
//!     .generate(&blueprint.terraform, &blueprint.source_registry(), &GenerateOptions::default())
//!     .await?;
//! println!("{} value file(s) written", report.written());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod generator;
pub mod init;
pub mod resolver;
pub mod shim;
pub mod tfvars;
pub mod variables;

pub use error::{TerraformError, TerraformResult};
pub use generator::{merge_values, ComponentReport, GenerateOptions, GenerationReport, Generator};
pub use init::{detect_module_path, predicted_module_dir, ModuleInitializer, DATA_DIR_ENV};
pub use resolver::{ModuleKind, ModuleResolver, ResolutionState, ResolvedModule};
pub use shim::{relative_source, ShimFiles, ShimGenerator};
pub use tfvars::{render_value_file, ValueFileOutcome, ValueFileWriter};
pub use variables::{parse_variables, parse_variables_str, OUTPUTS_FILE, VARIABLES_FILE};
