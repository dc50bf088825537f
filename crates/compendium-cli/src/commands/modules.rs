//! Modules command implementation

use colored::Colorize;
use compendium_core::SyncConfig;

/// List configured modules.
pub fn run_modules(config: &SyncConfig) {
    if config.modules.is_empty() {
        println!("No modules configured.");
        return;
    }

    for module in &config.modules {
        println!(
            "{} {} -> {} ({})",
            "*".green(),
            module.id.cyan().bold(),
            module.collection,
            module.kind.to_string().dimmed()
        );
        println!("    key: {}", module.key);
        for source in module.source_refs() {
            println!("    source: {source}");
        }
    }
}
