//! Boundary with the host media library

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One source item as handed over by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Absolute path of the source file
    pub path: PathBuf,
    /// Metadata the host exposes for path templating
    pub tags: BTreeMap<String, String>,
}

impl Track {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Host media library
///
/// `tracks` takes a consistent snapshot of the source list. Implementations
/// hold their read lock only for the duration of that call.
pub trait Library: Send + Sync {
    /// Ordered snapshot of the source items to mirror
    fn tracks(&self) -> Vec<Track>;

    /// Destination for `track` under `root`, computed from `format`
    fn output_path(&self, track: &Track, root: &Path, format: &str) -> PathBuf;

    /// Whether `track` should be transcoded rather than copied
    fn is_convertible(&self, track: &Track) -> bool;
}
