//! `core:version` and `core:check-updates`

use colored::Colorize;
use module_resolver::SemanticVersion;

use super::Outcome;
use crate::context::AppContext;
use crate::error::{CliError, Result};

pub fn run_core_version(ctx: &AppContext) -> Result<Outcome> {
    match &ctx.config.core.version {
        Some(version) => println!("{}: {}", "Platform version".dimmed(), version.cyan()),
        None => println!(
            "{}: {} (set {} in the config)",
            "Platform version".dimmed(),
            "unknown".yellow(),
            "core.version".cyan()
        ),
    }
    println!("{}: {}", "Manager version".dimmed(), env!("CARGO_PKG_VERSION"));
    Ok(Outcome::Success)
}

pub async fn run_core_check_updates(ctx: &AppContext) -> Result<Outcome> {
    let core = &ctx.config.core;
    let (Some(version), Some(repository)) = (&core.version, &core.repository) else {
        return Err(CliError::user(
            "core.version and core.repository must be set to check for platform updates",
        ));
    };
    let current = SemanticVersion::parse(version)
        .map_err(|e| CliError::user(format!("Invalid core.version: {e}")))?;

    match ctx.checker.check_core(&current, repository).await? {
        Some(release) => {
            let kind = if release.is_major_upgrade_from(&current) {
                "major update".yellow()
            } else {
                "update".green()
            };
            println!(
                "Platform {} available: {} -> {}",
                kind,
                current.to_string().dimmed(),
                release.version.to_string().green()
            );
            if !release.notes.trim().is_empty() {
                println!();
                println!("{}", release.notes.trim());
            }
        }
        None => println!("{} ({current})", "Platform is up to date".green()),
    }
    Ok(Outcome::Success)
}
