//! Generate command - Resolve modules and write shims and value files.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use modshim_core::OsFileSystem;
use modshim_oci::RegistryPuller;
use modshim_terraform::{GenerateOptions, GenerationReport, Generator, ValueFileOutcome};
use tracing::info;

use super::GlobalArgs;

#[derive(Args)]
pub struct GenerateArgs {
    /// Regenerate value files that already exist
    #[arg(long)]
    pub overwrite: bool,
}

pub async fn execute(global: &GlobalArgs, args: GenerateArgs) -> Result<()> {
    let (layout, blueprint) = global.blueprint()?;
    info!(
        "Generating context '{}' ({} component(s))",
        layout.context_name(),
        blueprint.terraform.len()
    );

    let generator = Generator::new(
        layout,
        Arc::new(OsFileSystem),
        Arc::new(super::system_runner()),
        Arc::new(RegistryPuller::from_env()),
    );
    let options = GenerateOptions::default().overwrite(args.overwrite);
    let report = generator
        .generate(&blueprint.terraform, &blueprint.source_registry(), &options)
        .await
        .context("Generation failed")?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &GenerationReport) {
    println!("Context: {}", report.context);
    for component in &report.components {
        let outcome = match component.value_file_outcome {
            ValueFileOutcome::Written => "written",
            ValueFileOutcome::Kept => "kept",
        };
        println!(
            "  {:<30} {:<7} {:<8} {}",
            component.path,
            format!("{:?}", component.kind).to_lowercase(),
            outcome,
            component.value_file.display()
        );
    }
    println!();
    println!(
        "{} value file(s) written, {} kept",
        report.written(),
        report.kept()
    );
}
