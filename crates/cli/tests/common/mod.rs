//! Common utilities for integration tests

pub mod cli;

pub use cli::{CommandResult, OwsCommand};

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A library directory, a destination root and a config file wiring them
pub struct Workspace {
    _temp: TempDir,
    pub base: PathBuf,
    pub library: PathBuf,
    pub dest: PathBuf,
    pub config: PathBuf,
}

impl Workspace {
    /// Plain copy mirror, no conversion and no covers
    pub fn new() -> Self {
        Self::with_extra_config("")
    }

    /// Same as [`Workspace::new`] with extra TOML appended to the config
    pub fn with_extra_config(extra: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let base = fs::canonicalize(temp.path()).unwrap();
        let library = base.join("library");
        let dest = base.join("dest");
        fs::create_dir_all(&library).unwrap();

        let config = base.join("config.toml");
        let contents = format!(
            "[library]\nsource = {:?}\nextensions = [\"flac\", \"mp3\"]\n\n\
             [sync]\nroot = {:?}\nworkers = 2\n{}",
            library.to_string_lossy(),
            dest.to_string_lossy(),
            extra
        );
        fs::write(&config, contents).unwrap();

        Self {
            _temp: temp,
            base,
            library,
            dest,
            config,
        }
    }

    /// Write a source file under the library
    pub fn add(&self, rel: &str, contents: &[u8]) -> PathBuf {
        let path = self.library.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();
        path
    }

    /// `ows --config <config>` followed by `args`
    pub fn ows(&self, args: &[&str]) -> OwsCommand {
        let mut cmd = OwsCommand::new(&self.base);
        cmd.arg("--config").arg(&self.config).args(args);
        cmd
    }

    pub fn dest_file(&self, rel: &str) -> PathBuf {
        self.dest.join(rel)
    }
}
