//! CLI command definitions.
//!
//! Each subcommand maps to one stage of the module pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use modshim_core::{Blueprint, CoreError, ProjectLayout, CONFIG_FILE_NAME};
use modshim_runner::{LogLine, LogStream, SystemRunner};
use tracing::{info, warn};

pub mod generate;
pub mod inspect;
pub mod preload;

/// modshim - Terraform module resolver and value-file generator
#[derive(Parser)]
#[command(name = "modshim")]
#[command(version, about = "modshim - Terraform module resolver and value-file generator")]
#[command(long_about = r#"
modshim resolves the Terraform modules declared by a context's blueprint
(local directories, OCI artifacts or remote sources), wraps each one in a
shim module and writes a commented value file listing its variables.

COMMANDS:
  generate  → Resolve modules, write shims and value files
  preload   → Pull and extract every OCI artifact only
  inspect   → Print the variables declared by a variables.tf as JSON

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Artifact cache or extraction error
  4 - Template error
  5 - Terraform or module error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project root holding modshim.yaml
    #[arg(short, long, global = true, default_value = ".")]
    pub project: PathBuf,

    /// Context to operate on (overrides MODSHIM_CONTEXT and modshim.yaml)
    #[arg(short, long, global = true)]
    pub context: Option<String>,
}

impl GlobalArgs {
    /// Project layout with the requested context applied.
    pub fn layout(&self) -> Result<ProjectLayout> {
        let layout = ProjectLayout::discover(&self.project)
            .with_context(|| format!("Failed to load project at {:?}", self.project))?;

        let Some(context) = &self.context else {
            return Ok(layout);
        };
        if context.is_empty() || context.contains(['/', '\\']) {
            return Err(CoreError::InvalidConfig {
                path: PathBuf::from(CONFIG_FILE_NAME),
                message: format!("invalid context name '{}'", context),
            }
            .into());
        }
        Ok(layout.with_context(context.clone()))
    }

    /// Layout plus the blueprint of the active context.
    pub fn blueprint(&self) -> Result<(ProjectLayout, Blueprint)> {
        let layout = self.layout()?;
        let blueprint = Blueprint::load(&layout.blueprint_file())
            .with_context(|| format!("Failed to load blueprint for context '{}'", layout.context_name()))?
            .with_default_paths(&layout);
        Ok((layout, blueprint))
    }
}

/// Runner that forwards initializer output to the log as it arrives.
pub fn system_runner() -> SystemRunner {
    SystemRunner::new().with_line_handler(Arc::new(|line: LogLine| {
        let message = line_message(&line.message);
        match line.stream {
            LogStream::Stdout => info!(target: "terraform", "{}", message),
            LogStream::Stderr => warn!(target: "terraform", "{}", message),
        }
    }))
}

/// Human-readable part of a terraform output line. JSON log records carry it
/// in `@message`; anything else is returned as is.
fn line_message(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|record| record.get("@message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| line.to_string())
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve modules and generate shims and value files
    Generate(generate::GenerateArgs),

    /// Pull and extract OCI artifacts without generating anything
    Preload(preload::PreloadArgs),

    /// Print parsed variable metadata as JSON
    Inspect(inspect::InspectArgs),
}
