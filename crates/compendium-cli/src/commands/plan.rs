//! Plan command implementation

use std::collections::HashMap;

use colored::Colorize;
use compendium_core::fingerprint::fingerprint_view;
use compendium_core::{ExistingEntry, Runtime, StorageId, SyncPlan};
use serde_json::{Map, Value, json};
use similar::TextDiff;

use crate::error::Result;

/// Run the plan command
///
/// Fetches and classifies one module's content without writing.
pub async fn run_plan(runtime: &Runtime, module: &str, json: bool, diff: bool) -> Result<()> {
    let module = runtime.module(module)?;
    let prepared = module.synchronizer().prepare(runtime.context()).await?;
    let ignore = &module.config().ignore;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&prepared.plan))?);
        return Ok(());
    }

    let plan = &prepared.plan;
    println!(
        "{} Plan for {} ({})",
        "=>".blue().bold(),
        module.id().cyan(),
        module.config().collection.dimmed()
    );
    if !prepared.collection_exists {
        println!("   {} collection does not exist yet", "!".yellow());
    }

    for create in &plan.to_create {
        println!("   {} {} ({})", "+".green(), create.key, create.fingerprint.to_string().dimmed());
    }

    let stored: HashMap<&StorageId, &ExistingEntry> =
        prepared.existing.iter().map(|e| (&e.id, e)).collect();
    for update in &plan.to_update {
        let previous = update
            .previous
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());
        println!(
            "   {} {} [{}] ({} -> {})",
            "~".yellow(),
            update.key,
            update.id,
            previous.dimmed(),
            update.fingerprint.to_string().dimmed()
        );
        if diff {
            match stored.get(&update.id).and_then(|e| e.content.as_ref()) {
                Some(content) => print_diff(content, &update.data, ignore),
                None => println!("      {}", "(stored content not fetched)".dimmed()),
            }
        }
    }

    for skipped in &plan.skipped {
        for issue in &skipped.issues {
            println!("   {} {}", "!".red(), issue);
        }
    }

    println!(
        "{} {} create, {} update, {} unchanged, {} skipped",
        "OK".green().bold(),
        plan.to_create.len(),
        plan.to_update.len(),
        plan.unchanged.len(),
        plan.skipped.len()
    );
    Ok(())
}

fn plan_json(plan: &SyncPlan) -> Value {
    json!({
        "create": plan.to_create.iter().map(|c| json!({
            "key": c.key,
            "fingerprint": c.fingerprint.to_string(),
        })).collect::<Vec<_>>(),
        "update": plan.to_update.iter().map(|u| json!({
            "key": u.key,
            "id": u.id,
            "previous": u.previous.as_ref().map(ToString::to_string),
            "fingerprint": u.fingerprint.to_string(),
        })).collect::<Vec<_>>(),
        "unchanged": plan.unchanged,
        "skipped": plan.skipped,
        "suspected_drift": plan.suspected_drift,
    })
}

/// Unified diff of the fingerprinted views, keys sorted.
fn print_diff(stored: &Map<String, Value>, incoming: &Map<String, Value>, ignore: &[String]) {
    let old = pretty(&fingerprint_view(stored, ignore));
    let new = pretty(&fingerprint_view(incoming, ignore));
    let diff = TextDiff::from_lines(&old, &new);
    let rendered = diff
        .unified_diff()
        .context_radius(2)
        .header("stored", "incoming")
        .to_string();
    for line in rendered.lines() {
        let line = match line.chars().next() {
            Some('+') if !line.starts_with("+++") => line.green().to_string(),
            Some('-') if !line.starts_with("---") => line.red().to_string(),
            Some('@') => line.cyan().to_string(),
            _ => line.to_string(),
        };
        println!("      {line}");
    }
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}
