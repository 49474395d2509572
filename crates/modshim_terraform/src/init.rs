//! External module initialization.
//!
//! Remote modules are downloaded by running `terraform init` against a
//! one-line configuration. Where the module landed is scraped from the JSON
//! log; when that fails the conventional location is assumed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use modshim_core::component::split_subpath;
use modshim_core::FileSystem;
use modshim_runner::{CommandRunner, CommandSpec};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::error::{TerraformError, TerraformResult};

/// Environment variable pointing terraform at a per-component data directory.
pub const DATA_DIR_ENV: &str = "TF_DATA_DIR";

/// Log text that precedes an installed module's directory.
pub const MODULE_PATH_MARKER: &str = "- main in ";

/// Name of the module block in generated entry files.
pub const MAIN_MODULE: &str = "main";

/// Arguments for a non-interactive, backend-less, upgrading, JSON-logged init.
pub const INIT_ARGS: [&str; 5] = ["init", "--backend=false", "-input=false", "-upgrade", "-json"];

/// Find the installed module directory in `terraform init -json` output.
///
/// Relative paths are resolved against `working_dir`. Only paths that exist
/// on disk are returned. Lines that are not JSON log records are ignored.
pub fn detect_module_path(output: &str, working_dir: &Path) -> Option<PathBuf> {
    output
        .lines()
        .filter_map(|line| serde_json::from_str::<Json>(line.trim()).ok())
        .filter(|record| field(record, "type") == Some("log"))
        .filter_map(|record| {
            let message = field(&record, "message")?;
            let at = message.find(MODULE_PATH_MARKER)?;
            let raw = message[at + MODULE_PATH_MARKER.len()..].trim();
            (!raw.is_empty()).then(|| working_dir.join(raw))
        })
        .find(|candidate| candidate.exists())
}

/// Terraform prefixes its JSON fields with `@`; accept both spellings.
fn field<'a>(record: &'a Json, name: &str) -> Option<&'a str> {
    record
        .get(format!("@{}", name))
        .or_else(|| record.get(name))
        .and_then(Json::as_str)
}

/// Where terraform installs the module when nothing better is known:
/// `<state_dir>/modules/main/<subpath>`.
pub fn predicted_module_dir(state_dir: &Path, source: &str) -> PathBuf {
    let (_, subpath) = split_subpath(source);
    let subpath = subpath.split('?').next().unwrap_or_default();
    subpath
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(state_dir.join("modules").join(MAIN_MODULE), |acc, s| {
            acc.join(s)
        })
}

/// One-line configuration that makes terraform fetch `source`.
pub fn bootstrap_config(source: &str) -> String {
    format!(
        "module \"{}\" {{ source = {} }}\n",
        MAIN_MODULE,
        crate::tfvars::quote(source)
    )
}

/// Runs `terraform init` for remote modules.
pub struct ModuleInitializer {
    runner: Arc<dyn CommandRunner>,
    fs: Arc<dyn FileSystem>,
    binary: String,
    timeout_seconds: u64,
}

impl ModuleInitializer {
    pub fn new(runner: Arc<dyn CommandRunner>, fs: Arc<dyn FileSystem>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            fs,
            binary: binary.into(),
            timeout_seconds: 0,
        }
    }

    /// Abort an init that runs longer than `seconds` (0 = never).
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Download `source` and return the directory holding its files.
    ///
    /// `shim_dir` receives the bootstrap entry file and is the working
    /// directory; `state_dir` isolates terraform's data for this component.
    pub async fn initialize(
        &self,
        source: &str,
        shim_dir: &Path,
        state_dir: &Path,
    ) -> TerraformResult<PathBuf> {
        let init_failed = |message: String| TerraformError::InitFailed {
            source_ref: source.to_string(),
            message,
        };

        let entry = shim_dir.join("main.tf");
        self.fs
            .write(&entry, bootstrap_config(source).as_bytes())
            .map_err(|e| TerraformError::Write {
                path: entry.clone(),
                source: e,
            })?;

        let spec = CommandSpec::new(&self.binary)
            .args(INIT_ARGS)
            .workdir(shim_dir)
            .env(DATA_DIR_ENV, state_dir.to_string_lossy())
            .timeout(self.timeout_seconds)
            .stream_output();

        info!(source = %source, "Running {}", spec.display());
        let result = match self.runner.run(&spec).await {
            Ok(result) if result.success() => result,
            Ok(result) => {
                self.discard_bootstrap(&entry);
                return Err(init_failed(format!(
                    "exit code {}: {}",
                    result.exit_code,
                    result.combined_output().trim()
                )));
            }
            Err(e) => {
                self.discard_bootstrap(&entry);
                return Err(init_failed(e.to_string()));
            }
        };

        if let Some(path) = detect_module_path(&result.stdout, shim_dir) {
            debug!("Module installed at {:?}", path);
            return Ok(path);
        }

        let predicted = predicted_module_dir(state_dir, source);
        warn!(
            source = %source,
            "Module path not found in init output, assuming {:?}",
            predicted
        );
        Ok(predicted)
    }

    // A bootstrap entry without its variable and output files is not a shim.
    fn discard_bootstrap(&self, entry: &Path) {
        if let Err(e) = self.fs.remove_file(entry) {
            debug!("Could not remove {:?}: {}", entry, e);
        }
    }
}
