//! Sync command implementation

use colored::Colorize;
use compendium_core::{HookOutcome, Runtime, SyncReport};
use serde_json::json;

use crate::error::{CliError, Result};

/// Run the sync command
///
/// Runs a manual pass for one module or all of them. Fails when any
/// module failed, after reporting every module.
pub async fn run_sync(
    runtime: &Runtime,
    module: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    if !json {
        let what = match module {
            Some(id) => format!("module {}", id.cyan()),
            None => format!("{} module(s)", runtime.modules().len()),
        };
        let verb = if dry_run { "Planning" } else { "Synchronizing" };
        println!("{} {verb} {what}...", "=>".blue().bold());
    }

    let outcomes = runtime.sync_manual(module, dry_run).await?;
    let failures = outcomes.iter().filter(|o| o.is_failure()).count();

    if json {
        let entries: Vec<_> = outcomes.iter().map(outcome_json).collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "results": entries }))?);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }

    if failures > 0 {
        return Err(CliError::user(format!("{failures} module(s) failed to sync")));
    }
    Ok(())
}

fn outcome_json(outcome: &HookOutcome) -> serde_json::Value {
    match outcome {
        HookOutcome::Synced(report) => json!({ "status": "ok", "report": report }),
        HookOutcome::Failed { module, message } => {
            json!({ "status": "failed", "module": module, "error": message })
        }
        HookOutcome::Diff(_) | HookOutcome::Ignored => json!({ "status": "ignored" }),
    }
}

fn print_outcome(outcome: &HookOutcome) {
    match outcome {
        HookOutcome::Synced(report) => print_report(report),
        HookOutcome::Failed { module, message } => {
            println!("{} {}: {}", "FAILED".red().bold(), module.cyan(), message);
        }
        HookOutcome::Diff(_) | HookOutcome::Ignored => {}
    }
}

fn print_report(report: &SyncReport) {
    let status = if report.dry_run {
        "DRY-RUN".yellow().bold()
    } else {
        "OK".green().bold()
    };
    println!(
        "{} {} ({}): {}",
        status,
        report.module.cyan(),
        report.collection.dimmed(),
        report.summary()
    );
    if report.missing_keys > 0 {
        println!(
            "   {} {} record(s) without a business key were skipped",
            "!".yellow(),
            report.missing_keys
        );
    }
    if report.suspected_drift > 0 {
        println!(
            "   {} {} update(s) had identical content; a normalizer may be unstable",
            "!".yellow(),
            report.suspected_drift
        );
    }
}
