//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Compendium Sync - Converge compendium collections toward JSON content documents
#[derive(Parser, Debug)]
#[command(name = "compendium")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to compendium.toml (searched upward from the current directory by default)
    #[arg(short, long, global = true, env = "COMPENDIUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Synchronize content documents into their collections
    ///
    /// Examples:
    ///   compendium sync                  # All modules
    ///   compendium sync --module spells  # One module
    ///   compendium sync --dry-run        # Count without writing
    Sync {
        /// Only sync this module
        #[arg(short, long)]
        module: Option<String>,

        /// Preview changes without applying them
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Report whether each collection matches its content
    Check {
        /// Only check this module
        #[arg(short, long)]
        module: Option<String>,
    },

    /// Show what a sync would create and update for one module
    Plan {
        /// Module to plan
        #[arg(short, long)]
        module: String,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,

        /// Show a unified diff of stored and incoming content for updates
        #[arg(long)]
        diff: bool,
    },

    /// List configured modules
    Modules,

    /// Print a record with embedded sub-record ids normalized
    Normalize {
        /// JSON file holding one record or an array of records
        file: PathBuf,

        /// Embedded containers to normalize
        #[arg(
            long = "container",
            default_values_t = vec!["effects".to_string(), "items".to_string()]
        )]
        containers: Vec<String>,
    },
}
