//! Module update manager CLI
//!
//! Checks the release host for module and platform updates and applies them
//! through the update state machine.

mod cli;
mod commands;
mod context;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Commands};
use commands::{Outcome, UpdateOptions};
use context::AppContext;
use error::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    tracing::debug!(config = %cli.config.display(), "Starting");

    match run(cli).await {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Failure) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let Some(command) = cli.command else {
        println!("{} module update manager", "modman".green().bold());
        println!();
        println!("Run {} for available commands.", "modman --help".cyan());
        return Ok(Outcome::Success);
    };

    let ctx = AppContext::load(&cli.config)?;
    match command {
        Commands::CheckUpdates { force, json } => {
            commands::run_check_updates(&ctx, force, json).await
        }
        Commands::Update {
            name,
            all: _,
            dry_run,
            force,
            yes,
        } => {
            let options = UpdateOptions {
                name,
                dry_run,
                force,
                yes,
            };
            commands::run_update(&ctx, &options).await
        }
        Commands::CoreCheckUpdates => commands::run_core_check_updates(&ctx).await,
        Commands::CoreVersion => commands::run_core_version(&ctx),
    }
}
