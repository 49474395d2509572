//! modshim CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Artifact cache or extraction error
//! - 4: Template error
//! - 5: Terraform or module error

use std::process::ExitCode;

use clap::Parser;
use modshim_core::CoreError;
use modshim_oci::OciError;
use modshim_templates::TemplateError;
use modshim_terraform::TerraformError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const CACHE_ERROR: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
    pub const TERRAFORM_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json);

    let result = match cli.command {
        Commands::Generate(args) => commands::generate::execute(&cli.global, args).await,
        Commands::Preload(args) => commands::preload::execute(&cli.global, args).await,
        Commands::Inspect(args) => commands::inspect::execute(&cli.global, args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "modshim=debug" } else { "modshim=info" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [default_level, "warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);
    // Stdout carries command output only.
    let log_result = if json {
        registry
            .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Map the first typed error in the chain to an exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<TerraformError>() {
            return match err.root() {
                TerraformError::Core(_) => ExitCodes::INVALID_CONFIG,
                TerraformError::Oci(_) => ExitCodes::CACHE_ERROR,
                TerraformError::Template(_) => ExitCodes::TEMPLATE_ERROR,
                _ => ExitCodes::TERRAFORM_ERROR,
            };
        }
        if cause.is::<CoreError>() {
            return ExitCodes::INVALID_CONFIG;
        }
        if cause.is::<OciError>() {
            return ExitCodes::CACHE_ERROR;
        }
        if cause.is::<TemplateError>() {
            return ExitCodes::TEMPLATE_ERROR;
        }
    }
    ExitCodes::GENERAL_ERROR
}
