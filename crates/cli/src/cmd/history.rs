//! Show the recorded outcomes for one source file

use crate::{system_config, util};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::fs;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, source: &Path, json: bool) -> Result<()> {
    let config = system_config::load(config_path)?;
    let ledger = util::open_ledger(&config.sync.root)?;

    // The source may be gone already; fall back to a lexical absolute path
    let source = fs::canonicalize(source)
        .or_else(|_| std::path::absolute(source))
        .with_context(|| format!("Invalid source path: {}", source.display()))?;

    let records = ledger.history(&source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", format!("No history for {}", source.display()).yellow());
        return Ok(());
    }

    println!("{} {}", "History for".bold(), source.display().to_string().cyan());
    println!();

    for record in &records {
        let when = util::format_absolute_time(record.timestamp);
        let generation = format!("gen {:>4}", record.sync_generation);

        match record.destination() {
            Some(destination) => {
                let transform = record
                    .transform
                    .as_deref()
                    .map(|preset| format!(" [{}]", preset))
                    .unwrap_or_default();
                println!(
                    "  {}  {}  {}{}",
                    when.dimmed(),
                    generation.yellow(),
                    destination.display(),
                    transform.cyan()
                );
            }
            None => println!("  {}  {}  {}", when.dimmed(), generation.yellow(), "removed".red()),
        }
    }

    println!();
    println!("{} records", records.len());
    Ok(())
}
