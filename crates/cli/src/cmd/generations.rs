//! List sync generations, newest first

use crate::{system_config, util};
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let config = system_config::load(config_path)?;
    let ledger = util::open_ledger(&config.sync.root)?;
    let limit = limit.unwrap_or(20);

    let generations = ledger.generations()?;
    if generations.is_empty() {
        println!("{}", "No sync generations yet".yellow());
        return Ok(());
    }

    println!("{}", "Sync Generations".bold());
    println!();

    for generation in generations.iter().rev().take(limit) {
        let cover = match (&generation.cover_filename, generation.cover_sync_enabled) {
            (Some(name), true) => format!("cover={}", name),
            _ => "cover=off".to_string(),
        };
        let flags = if generation.remove_unreferenced {
            format!("{} prune", cover)
        } else {
            cover
        };

        println!(
            "  {} {} {}",
            format!("#{:<5}", generation.id).yellow(),
            util::format_relative_time(generation.created_at),
            format!("({})", util::format_absolute_time(generation.created_at)).dimmed()
        );
        println!("         {}  {}", generation.filename_format.cyan(), flags.dimmed());
    }

    if generations.len() > limit {
        println!();
        println!(
            "{}",
            format!("{} older generations not shown", generations.len() - limit).dimmed()
        );
    }
    Ok(())
}
