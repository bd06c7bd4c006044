//! `module:check-updates`

use colored::Colorize;
use module_update::{AvailableUpdate, CheckUpdatesJob};

use super::Outcome;
use crate::context::AppContext;
use crate::error::Result;

pub async fn run_check_updates(ctx: &AppContext, force: bool, json: bool) -> Result<Outcome> {
    let job = CheckUpdatesJob::new(ctx.checker.clone(), force, &ctx.config.update);
    let updates = ctx.queue.dispatch(&job).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updates)?);
    } else {
        print_updates(&updates);
    }
    Ok(Outcome::Success)
}

fn print_updates(updates: &[AvailableUpdate]) {
    if updates.is_empty() {
        println!("{}", "All modules are up to date.".green());
        return;
    }

    println!("{}", "Available Updates".bold());
    println!();
    for update in updates {
        let marker = if update.is_major {
            " (major)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {} -> {}{}",
            "+".green(),
            update.name.cyan(),
            update.current_version.to_string().dimmed(),
            update.available_version.to_string().green(),
            marker
        );
    }
    println!();
    println!(
        "Run {} to apply them.",
        "modman module:update --all".cyan()
    );
}
