//! Inspect command - Print variable metadata.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use modshim_core::{OsFileSystem, VariableInfo};
use modshim_terraform::parse_variables;

use super::GlobalArgs;

#[derive(Args)]
pub struct InspectArgs {
    /// Path to a variables.tf file
    pub file: PathBuf,

    /// Include protected variables
    #[arg(long)]
    pub all: bool,
}

pub async fn execute(global: &GlobalArgs, args: InspectArgs) -> Result<()> {
    let variables = inspect(global, &args)?;
    println!("{}", serde_json::to_string_pretty(&variables)?);
    Ok(())
}

/// Parsed variables of `args.file` with sensitive defaults redacted.
fn inspect(global: &GlobalArgs, args: &InspectArgs) -> Result<Vec<VariableInfo>> {
    let protected = if args.all {
        Vec::new()
    } else {
        global.layout()?.config().protected_variables.clone()
    };

    let variables = parse_variables(&OsFileSystem, &args.file, &protected)
        .with_context(|| format!("Failed to inspect {:?}", args.file))?;
    Ok(variables.iter().map(VariableInfo::redacted).collect())
}
