//! # modshim_core
//!
//! Shared building blocks for modshim.
//!
//! This crate holds the data model that flows through module resolution and
//! value-file synthesis, the project configuration, the default blueprint
//! reader, and the filesystem port used by every generator.
//!
//! # Architecture
//!
//! - **Component**: one infrastructure module instance from the blueprint
//! - **ModuleSource**: where a component's module comes from (local, OCI, remote)
//! - **Value**: the tagged value tree used for inputs, defaults and overrides
//! - **ProjectLayout**: every derived path (shim dirs, value files, caches)
//! - **FileSystem**: injectable file I/O so generators can be tested in isolation
//!
//! # Example
//!
//! ```rust,no_run
//! use modshim_core::{Blueprint, ProjectLayout};
//!
//! let layout = ProjectLayout::discover(".")?;
//! let blueprint = Blueprint::load(&layout.blueprint_file())?.with_default_paths(&layout);
//! for component in &blueprint.terraform {
//!     println!("{} -> {}", component.path, component.full_path.display());
//! }
//! # Ok::<(), modshim_core::CoreError>(())
//! ```

pub mod blueprint;
pub mod component;
pub mod config;
pub mod error;
pub mod fs;
pub mod value;

pub use blueprint::Blueprint;
pub use component::{Component, ModuleSource, Source, SourceRef, SourceRegistry, VariableInfo};
pub use config::{ProjectConfig, ProjectLayout, CONFIG_FILE_NAME};
pub use error::{CoreError, CoreResult};
pub use fs::{FileSystem, OsFileSystem};
#[cfg(any(test, feature = "mocks"))]
pub use fs::MockFileSystem;
pub use value::Value;
