//! Check command implementation

use colored::Colorize;
use compendium_core::Runtime;

use crate::error::{CliError, Result};

/// Run the check command
///
/// Dry-runs every selected module and reports whether its collection is in
/// sync. Never writes.
pub async fn run_check(runtime: &Runtime, module: Option<&str>) -> Result<()> {
    println!("{} Checking collections...", "=>".blue().bold());

    let mut failures = 0;
    for (id, result) in runtime.check(module).await? {
        match result {
            Ok(report) if report.is_in_sync() => {
                println!(
                    "{} {} ({}): {} record(s) in sync",
                    "OK".green().bold(),
                    id.cyan(),
                    report.collection.dimmed(),
                    report.unchanged
                );
            }
            Ok(report) => {
                println!(
                    "{} {} ({}): {} create, {} update",
                    "PENDING".yellow().bold(),
                    id.cyan(),
                    report.collection.dimmed(),
                    report.created,
                    report.updated
                );
            }
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "FAILED".red().bold(), id.cyan(), e);
            }
        }
    }

    if failures > 0 {
        return Err(CliError::user(format!("{failures} module(s) could not be checked")));
    }
    Ok(())
}
