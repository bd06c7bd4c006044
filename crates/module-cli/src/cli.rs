//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use module_update::config::DEFAULT_CONFIG_FILE;

/// Module update manager - check for and apply platform module updates
#[derive(Parser, Debug)]
#[command(name = "modman")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the manager configuration
    #[arg(long, global = true, env = "MODMAN_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List modules with a newer release
    #[command(name = "module:check-updates")]
    CheckUpdates {
        /// Ignore the cached result
        #[arg(long)]
        force: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Update one module, or every module with an available update
    ///
    /// Examples:
    ///   modman module:update forum            # Update one module
    ///   modman module:update forum --dry-run  # Show what would change
    ///   modman module:update --all            # Update everything, dependencies first
    #[command(name = "module:update")]
    Update {
        /// Module to update
        #[arg(conflicts_with = "all", required_unless_present = "all")]
        name: Option<String>,

        /// Update every module with an available update
        #[arg(long)]
        all: bool,

        /// Show the planned update without applying it
        #[arg(long)]
        dry_run: bool,

        /// Skip the newer-version and requirement checks
        #[arg(long)]
        force: bool,

        /// Do not ask before a major version upgrade
        #[arg(short, long)]
        yes: bool,
    },

    /// Check the release host for a newer platform release
    #[command(name = "core:check-updates")]
    CoreCheckUpdates,

    /// Show the installed platform version
    #[command(name = "core:version")]
    CoreVersion,
}
