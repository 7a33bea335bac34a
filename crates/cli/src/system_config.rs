//! System configuration file (`config.toml`)
//!
//! Sections:
//! - `[library]`: where sources live and which files count as tracks
//! - `[sync]`: the engine's [`SyncConfig`]
//! - `[transcoder]`: external conversion command
//! - `[artwork]`: candidate cover file names

use anyhow::{bail, Context, Result};
use engine::SyncConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub library: LibraryConfig,
    pub sync: SyncConfig,
    pub transcoder: TranscoderConfig,
    pub artwork: ArtworkConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root of the source collection
    pub source: PathBuf,
    /// File extensions that are mirrored (case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            extensions: ["flac", "mp3", "ogg", "opus", "m4a", "wav"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Program and arguments; `{input}`, `{output}` and `{preset}` are substituted.
    /// Conversion is disabled when unset.
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtworkConfig {
    /// File names looked up next to each track, in priority order
    pub names: Vec<String>,
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            names: ["cover.jpg", "folder.jpg", "front.jpg", "cover.png", "folder.png"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<()> {
        if self.library.source.as_os_str().is_empty() {
            bail!("library.source must be set");
        }
        if self.library.extensions.is_empty() {
            bail!("library.extensions must list at least one extension");
        }

        self.sync.validate()?;

        if let Some(command) = &self.transcoder.command {
            if command.is_empty() {
                bail!("transcoder.command must not be empty (remove it to disable conversion)");
            }
            if !command.iter().any(|arg| arg.contains("{output}")) {
                bail!("transcoder.command must contain an {{output}} placeholder");
            }
        }

        if self.sync.cover.enabled && self.artwork.names.is_empty() {
            bail!("artwork.names must not be empty when cover sync is enabled");
        }

        Ok(())
    }
}

/// Default config file location: `$XDG_CONFIG_HOME/ows/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ows").join("config.toml"))
}

/// Resolve an explicit path or fall back to the default location
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => config_file_path().context("Could not determine config file path"),
    }
}

/// Load the config, falling back to defaults when the file does not exist
pub fn load(explicit: Option<&Path>) -> Result<SystemConfig> {
    let path = resolve_path(explicit)?;
    if !path.exists() {
        if explicit.is_some() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(SystemConfig::default());
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<SystemConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

pub fn save(config: &SystemConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write the example config to `path` unless it already exists
///
/// Returns whether a file was created.
pub fn init_if_missing(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, example_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

pub fn example_config() -> &'static str {
    r#"# ows configuration

[library]
# Root of the collection to mirror
source = "/home/user/Music"
extensions = ["flac", "mp3", "ogg", "opus", "m4a", "wav"]

[sync]
# Destination root; the sync ledger is kept in <root>/.ows
root = "/media/player/Music"
# Tokens: {dir} {parent} {stem} {ext} {filename}
filename_format = "{dir}/{stem}.{ext}"
workers = 4
remove_unreferenced = false

[sync.cover]
enabled = true
filename = "cover.jpg"
timeout_ms = 5000

[sync.conversion]
preset = "opus-128"
extension = "opus"
filetypes = ["flac", "wav"]
# bits_per_sample = 16
# float_output = false

[transcoder]
# Remove to disable conversion; convertible files are then skipped
command = ["ffmpeg", "-y", "-loglevel", "error", "-i", "{input}", "-c:a", "libopus", "-b:a", "128k", "{output}"]

[artwork]
names = ["cover.jpg", "folder.jpg", "front.jpg", "cover.png", "folder.png"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_example_config_parses_and_validates() {
        let config: SystemConfig = toml::from_str(example_config()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.sync.workers, 4);
        assert!(config.sync.cover.enabled);
        assert_eq!(config.sync.conversion.filetypes, vec!["flac", "wav"]);
        assert!(config.transcoder.command.is_some());
    }

    #[test]
    fn test_missing_keys_fall_back_to_defaults() {
        let config: SystemConfig = toml::from_str(
            r#"
            [library]
            source = "/music"

            [sync]
            root = "/dest"
            "#,
        )
        .unwrap();

        assert_eq!(config.library.extensions, LibraryConfig::default().extensions);
        assert_eq!(config.sync.filename_format, "{dir}/{stem}.{ext}");
        assert_eq!(config.sync.cover.timeout_ms, 5_000);
        assert!(config.transcoder.command.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_names_the_key() {
        let mut config: SystemConfig = toml::from_str(example_config()).unwrap();
        config.sync.workers = 100;
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("sync.workers"));

        let mut config: SystemConfig = toml::from_str(example_config()).unwrap();
        config.transcoder.command = Some(vec!["ffmpeg".into(), "-i".into(), "{input}".into()]);
        assert!(config.validate().unwrap_err().to_string().contains("{output}"));
    }

    #[test]
    fn test_save_and_load_round_trip_through_disk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.toml");

        let mut config = SystemConfig::default();
        config.library.source = "/music".into();
        config.sync.root = "/dest".into();
        config.sync.remove_unreferenced = true;
        save(&config, &path).unwrap();

        assert_eq!(load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_init_if_missing_does_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ows/config.toml");

        assert!(init_if_missing(&path).unwrap());
        fs::write(&path, "[library]\nsource = \"/mine\"\n").unwrap();
        assert!(!init_if_missing(&path).unwrap());
        assert_eq!(load_from(&path).unwrap().library.source, PathBuf::from("/mine"));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load(Some(&temp_dir.path().join("nope.toml"))).is_err());
    }
}
