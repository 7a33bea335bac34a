//! Shared formatting helpers for CLI commands

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use ledger::Ledger;
use std::path::Path;

/// Format Unix seconds as local time ("2024-01-03 14:30:00")
pub fn format_absolute_time(ts_secs: u64) -> String {
    DateTime::from_timestamp(ts_secs as i64, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Format Unix seconds relative to now ("2 hours ago")
pub fn format_relative_time(ts_secs: u64) -> String {
    let now = ledger::now_secs();
    let Some(seconds) = now.checked_sub(ts_secs) else {
        return "in the future".to_string();
    };

    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Open the ledger of an already-synced root
pub fn open_ledger(root: &Path) -> Result<Ledger> {
    if !Ledger::exists(root) {
        bail!(
            "No sync ledger under {} (run 'ows sync' first)",
            root.display()
        );
    }
    Ledger::open(root).with_context(|| format!("Failed to open sync ledger under {}", root.display()))
}
