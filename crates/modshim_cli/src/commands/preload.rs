//! Preload command - Pull and extract OCI artifacts.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use modshim_core::OsFileSystem;
use modshim_oci::RegistryPuller;
use modshim_terraform::Generator;

use super::GlobalArgs;

#[derive(Args)]
pub struct PreloadArgs {
    /// Print the extracted module directories as JSON
    #[arg(long)]
    pub list: bool,
}

pub async fn execute(global: &GlobalArgs, args: PreloadArgs) -> Result<()> {
    let (layout, blueprint) = global.blueprint()?;

    let generator = Generator::new(
        layout,
        Arc::new(OsFileSystem),
        Arc::new(super::system_runner()),
        Arc::new(RegistryPuller::from_env()),
    );
    let extracted = generator
        .prefetch(&blueprint.terraform, &blueprint.source_registry())
        .await
        .context("Preload failed")?;

    if args.list {
        let listing: serde_json::Map<String, serde_json::Value> = extracted
            .iter()
            .map(|(path, module)| {
                (
                    path.clone(),
                    serde_json::Value::String(module.module_dir.display().to_string()),
                )
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        for (path, module) in &extracted {
            println!("  {:<30} {}", path, module.module_dir.display());
        }
        println!("{} OCI module(s) ready", extracted.len());
    }
    Ok(())
}
