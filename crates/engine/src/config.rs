//! Sync policy configuration

use crate::error::{Result, SyncError};
use crate::transcode::ConvertSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MAX_WORKERS: usize = 64;
pub const MAX_COVER_TIMEOUT_MS: u64 = 60_000;

/// Policy for one destination root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Destination root; the ledger lives under it
    pub root: PathBuf,
    /// Path template handed to the library, relative to `root`
    pub filename_format: String,
    /// Worker threads for the execution phase (1-64)
    pub workers: usize,
    /// Delete artifacts whose source was not seen in a run
    pub remove_unreferenced: bool,
    pub cover: CoverConfig,
    pub conversion: ConversionConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            filename_format: "{dir}/{stem}.{ext}".to_string(),
            workers: default_workers(),
            remove_unreferenced: false,
            cover: CoverConfig::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverConfig {
    pub enabled: bool,
    /// File name artwork is written to in each destination directory
    pub filename: String,
    /// How long to wait for one artwork lookup (1-60000 ms)
    pub timeout_ms: u64,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: "cover.jpg".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Preset name recorded with every converted artifact
    pub preset: String,
    /// Extension of converted artifacts
    pub extension: String,
    /// Source extensions that are converted instead of copied
    pub filetypes: Vec<String>,
    pub bits_per_sample: Option<u16>,
    pub float_output: Option<bool>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preset: "default".to_string(),
            extension: "ogg".to_string(),
            filetypes: Vec::new(),
            bits_per_sample: None,
            float_output: None,
        }
    }
}

impl ConversionConfig {
    pub fn settings(&self) -> ConvertSettings {
        ConvertSettings {
            preset: self.preset.clone(),
            bits_per_sample: self.bits_per_sample,
            float_output: self.float_output,
        }
    }

    /// Whether `path` has one of the configured filetypes (case-insensitive)
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.filetypes
            .iter()
            .any(|ft| ft.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl SyncConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Check every field against its valid range
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(SyncError::invalid("sync.root", "must be set"));
        }
        if self.filename_format.trim().is_empty() {
            return Err(SyncError::invalid("sync.filename_format", "must not be empty"));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(SyncError::invalid(
                "sync.workers",
                format!("must be between 1 and {MAX_WORKERS}, got {}", self.workers),
            ));
        }

        if !(1..=MAX_COVER_TIMEOUT_MS).contains(&self.cover.timeout_ms) {
            return Err(SyncError::invalid(
                "sync.cover.timeout_ms",
                format!(
                    "must be between 1 and {MAX_COVER_TIMEOUT_MS}, got {}",
                    self.cover.timeout_ms
                ),
            ));
        }
        if self.cover.enabled
            && (self.cover.filename.is_empty() || self.cover.filename.contains(|c: char| c == '/' || c == '\\'))
        {
            return Err(SyncError::invalid(
                "sync.cover.filename",
                "must be a plain file name",
            ));
        }

        if self.conversion.preset.trim().is_empty() {
            return Err(SyncError::invalid("sync.conversion.preset", "must not be empty"));
        }
        if self.conversion.extension.trim_start_matches('.').is_empty() {
            return Err(SyncError::invalid("sync.conversion.extension", "must not be empty"));
        }
        if let Some(bits) = self.conversion.bits_per_sample {
            if ![8, 16, 24, 32].contains(&bits) {
                return Err(SyncError::invalid(
                    "sync.conversion.bits_per_sample",
                    format!("must be one of 8, 16, 24, 32, got {bits}"),
                ));
            }
        }

        Ok(())
    }
}
