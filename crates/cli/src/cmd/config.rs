//! Configuration inspection commands

use crate::system_config;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

/// Print the effective configuration as TOML
pub async fn run_show(config_path: Option<&Path>) -> Result<()> {
    let config = system_config::load(config_path)?;
    let location = system_config::resolve_path(config_path)?;

    println!("{}", "Effective Configuration".bold());
    if location.exists() {
        println!("{}: {}\n", "Location".dimmed(), location.display().dimmed());
    } else {
        println!("{}\n", "No config file, showing defaults".dimmed());
    }

    let rendered = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{}", rendered);

    if let Err(e) = config.validate() {
        println!("{} {}", "Warning:".yellow().bold(), e);
    }
    Ok(())
}

/// Show the config file path and optionally create it
pub async fn run_path(config_path: Option<&Path>, create: bool) -> Result<()> {
    let location = system_config::resolve_path(config_path)?;

    if create && !location.exists() {
        system_config::init_if_missing(&location)?;
        println!("{} Created config file at: {}", "✓".green(), location.display());
    } else {
        println!("{}", location.display());
        if !location.exists() {
            println!("{}", "File does not exist. Use --create to create it.".yellow());
        }
    }

    Ok(())
}

/// Show example configuration
pub async fn run_example() -> Result<()> {
    println!("{}", system_config::example_config());
    Ok(())
}
