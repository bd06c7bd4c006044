//! `module:update`

use std::io::IsTerminal;

use colored::Colorize;
use dialoguer::Confirm;
use module_update::{
    BatchReport, BatchUpdateJob, CheckUpdatesJob, Error, UpdateModuleJob, UpdatePreview,
    UpdateResult, UpdateStatus,
};

use super::Outcome;
use crate::context::AppContext;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// `None` updates every module with an available update.
    pub name: Option<String>,
    pub dry_run: bool,
    pub force: bool,
    pub yes: bool,
}

pub async fn run_update(ctx: &AppContext, options: &UpdateOptions) -> Result<Outcome> {
    match &options.name {
        Some(name) => update_one(ctx, name, options).await,
        None => update_all(ctx, options).await,
    }
}

async fn update_one(ctx: &AppContext, name: &str, options: &UpdateOptions) -> Result<Outcome> {
    if !ctx.registry.read().await.contains(name) {
        return Err(CliError::user(format!("Module not found: {name}")));
    }

    let orchestrator = ctx.orchestrator(options.force)?;
    let preview = orchestrator.preview(name).await.map_err(user_facing)?;
    print_preview(&preview);

    if options.dry_run {
        println!("{}", "Dry run, nothing was changed.".dimmed());
        return Ok(Outcome::Success);
    }
    if preview.is_major_update && !confirm_major(options, &[preview.module_name.as_str()])? {
        println!("{}", "Update cancelled.".yellow());
        return Ok(Outcome::Failure);
    }

    let job = UpdateModuleJob::new(orchestrator, name, &ctx.config.update);
    let result = ctx.queue.dispatch(&job).await?;
    print_result(&result);
    Ok(Outcome::from_success(result.is_success()))
}

async fn update_all(ctx: &AppContext, options: &UpdateOptions) -> Result<Outcome> {
    let check = CheckUpdatesJob::new(ctx.checker.clone(), false, &ctx.config.update);
    let updates = ctx.queue.dispatch(&check).await?;
    if updates.is_empty() {
        println!("{}", "All modules are up to date.".green());
        return Ok(Outcome::Success);
    }

    let orchestrator = ctx.orchestrator(options.force)?;

    if options.dry_run {
        for update in &updates {
            print_preview(&orchestrator.preview(&update.name).await.map_err(user_facing)?);
        }
        println!("{}", "Dry run, nothing was changed.".dimmed());
        return Ok(Outcome::Success);
    }

    let majors: Vec<&str> = updates
        .iter()
        .filter(|u| u.is_major)
        .map(|u| u.name.as_str())
        .collect();
    if !majors.is_empty() && !confirm_major(options, &majors)? {
        println!("{}", "Update cancelled.".yellow());
        return Ok(Outcome::Failure);
    }

    let job = BatchUpdateJob::new(
        orchestrator,
        ctx.checker.clone(),
        ctx.queue.clone(),
        None,
        &ctx.config.update,
    );
    let report = ctx.queue.dispatch(&job).await?;
    print_report(&report);
    Ok(Outcome::from_success(report.is_success()))
}

/// Ask before a major upgrade unless `--yes` or `--force` was given.
///
/// Without a terminal to ask on, the upgrade is declined.
fn confirm_major(options: &UpdateOptions, modules: &[&str]) -> Result<bool> {
    if options.yes || options.force {
        return Ok(true);
    }
    let prompt = format!(
        "{} major version upgrade(s): {}. Continue?",
        modules.len(),
        modules.join(", ")
    );
    if !std::io::stdin().is_terminal() {
        println!("{prompt} {}", "(not a terminal, pass --yes to confirm)".dimmed());
        return Ok(false);
    }
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}

fn user_facing(error: Error) -> CliError {
    match error {
        Error::ReleaseNotFound(name) => {
            CliError::user(format!("No release available for module {name}"))
        }
        Error::ModuleNotFound(name) => CliError::user(format!("Module not found: {name}")),
        other => other.into(),
    }
}

fn print_preview(preview: &UpdatePreview) {
    let major = if preview.is_major_update {
        " (major)".yellow().to_string()
    } else {
        String::new()
    };
    println!(
        "{} {} -> {}{}",
        preview.module_name.cyan().bold(),
        preview.from_version.to_string().dimmed(),
        preview.to_version.to_string().green(),
        major
    );
    if preview.pending_migrations > 0 {
        println!("  {} pending migration(s)", preview.pending_migrations);
    }
    for unmet in &preview.unmet_requirements {
        println!("  {} {}", "!".red(), unmet);
    }
    if !preview.release_notes.trim().is_empty() {
        for line in preview.release_notes.trim().lines() {
            println!("  {}", line.dimmed());
        }
    }
}

fn print_result(result: &UpdateResult) {
    let versions = match (result.from_version, result.to_version) {
        (Some(from), Some(to)) => format!(" ({from} -> {to})"),
        _ => String::new(),
    };
    let reason = result.error_message.as_deref().unwrap_or("unknown error");
    match result.status {
        UpdateStatus::Completed => println!(
            "{} {} updated{}",
            "+".green(),
            result.module_name.cyan(),
            versions
        ),
        UpdateStatus::RolledBack => println!(
            "{} {} failed and was rolled back{}: {}",
            "-".yellow(),
            result.module_name.cyan(),
            versions,
            reason
        ),
        status => println!(
            "{} {} {}{}: {}",
            "x".red(),
            result.module_name.cyan(),
            status,
            versions,
            reason
        ),
    }
}

fn print_report(report: &BatchReport) {
    for result in &report.results {
        print_result(result);
    }
    for (name, reason) in &report.failed {
        if !report.results.iter().any(|r| &r.module_name == name) {
            println!("{} {} failed: {}", "x".red(), name.cyan(), reason);
        }
    }
    for name in &report.skipped {
        println!(
            "{} {} skipped, a dependency failed",
            "-".dimmed(),
            name.cyan()
        );
    }
    println!();
    println!(
        "{} updated, {} failed, {} skipped",
        report.success.len().to_string().green(),
        report.failed.len().to_string().red(),
        report.skipped.len()
    );
}
