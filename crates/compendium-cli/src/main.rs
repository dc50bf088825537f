//! Compendium Sync CLI
//!
//! Runs sync passes over the modules declared in `compendium.toml`.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use compendium_core::Runtime;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

const DEFAULT_FILTER: &str = "warn,compendium_core=info,compendium_cli=info";
const VERBOSE_FILTER: &str = "info,compendium_core=debug,compendium_cli=debug";

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr so stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("Verbose mode enabled");

    let Some(command) = cli.command else {
        println!("{} Compendium Sync CLI", "compendium".green().bold());
        println!();
        println!("Run {} for available commands.", "compendium --help".cyan());
        return Ok(());
    };

    // Needs no configuration
    if let Commands::Normalize { file, containers } = &command {
        return commands::run_normalize(file, containers);
    }

    let config = context::load_config(cli.config.as_deref())?;
    if matches!(command, Commands::Modules) {
        commands::run_modules(&config);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let sync = Runtime::from_config(&config);

    runtime.block_on(async {
        match command {
            Commands::Sync {
                module,
                dry_run,
                json,
            } => commands::run_sync(&sync, module.as_deref(), dry_run, json).await,
            Commands::Check { module } => commands::run_check(&sync, module.as_deref()).await,
            Commands::Plan { module, json, diff } => {
                commands::run_plan(&sync, &module, json, diff).await
            }
            Commands::Modules | Commands::Normalize { .. } => Ok(()),
        }
    })
}
