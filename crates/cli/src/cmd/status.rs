//! Show destination and ledger status

use crate::{system_config, util};
use anyhow::Result;
use ledger::Ledger;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    // 1. Resolve configuration
    let config = system_config::load(config_path)?;
    let location = system_config::resolve_path(config_path)?;

    println!("{}", "Mirror Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    print!("Config:        ");
    if location.exists() {
        println!("{}", location.display());
    } else {
        println!("{} {}", location.display(), "(defaults)".dimmed());
    }
    println!("Library:       {}", config.library.source.display().to_string().cyan());
    println!("Destination:   {}", config.sync.root.display().to_string().cyan());
    println!("Workers:       {}", config.sync.workers);
    if !config.sync.conversion.filetypes.is_empty() {
        println!(
            "Conversion:    {} -> .{} with preset {}",
            config.sync.conversion.filetypes.join(", "),
            config.sync.conversion.extension,
            config.sync.conversion.preset.yellow()
        );
    }
    println!();

    // 2. Ledger state
    if !Ledger::exists(&config.sync.root) {
        println!("Ledger:        {}", "Not created".yellow());
        println!("  {}", "Tip: Run 'ows sync' to create it".dimmed());
        return Ok(());
    }

    let ledger = util::open_ledger(&config.sync.root)?;
    let generations = ledger.generations()?;
    let artifacts = ledger.live_artifacts();
    let converted = artifacts.iter().filter(|r| r.transform.is_some()).count();

    println!("Ledger:        {}", "Present ✓".green());
    println!("  Records:     {}", ledger.record_count());
    println!("  Sources:     {}", ledger.source_count());
    println!("  Artifacts:   {} ({} converted)", artifacts.len(), converted);

    match generations.last() {
        Some(latest) => {
            println!(
                "  Last sync:   #{} {} {}",
                latest.id,
                util::format_relative_time(latest.created_at),
                format!("({})", util::format_absolute_time(latest.created_at)).dimmed()
            );
        }
        None => println!("  Last sync:   {}", "never".yellow()),
    }

    Ok(())
}
