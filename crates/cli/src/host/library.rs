//! Directory-scanning media library with filename templating

use anyhow::{Context, Result};
use engine::{ConversionConfig, Library, Track};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Characters that cannot appear in a single path component on common filesystems
const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Library made of every matching file under one directory
///
/// Template tokens: `{dir}` (source directory relative to the library root,
/// inserted as a path), `{parent}`, `{stem}`, `{ext}` and `{filename}`.
/// Token values other than `{dir}` have reserved characters replaced by `-`.
pub struct DirectoryLibrary {
    root: PathBuf,
    extensions: Vec<String>,
    conversion: ConversionConfig,
    tracks: RwLock<Vec<Track>>,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>, conversion: ConversionConfig) -> Self {
        Self {
            root: root.into(),
            extensions,
            conversion,
            tracks: RwLock::new(Vec::new()),
        }
    }

    /// Rescan the directory, returning the number of tracks found
    pub fn scan(&self) -> Result<usize> {
        let root = fs::canonicalize(&self.root)
            .with_context(|| format!("Library directory not found: {}", self.root.display()))?;

        let mut tracks = Vec::new();
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable library entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && self.is_wanted(entry.path()) {
                tracks.push(track_for(&root, entry.path()));
            }
        }

        let count = tracks.len();
        *self.tracks.write() = tracks;
        info!(root = %root.display(), tracks = count, "Scanned library");
        Ok(count)
    }

    fn is_wanted(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
    }
}

impl Library for DirectoryLibrary {
    fn tracks(&self) -> Vec<Track> {
        self.tracks.read().clone()
    }

    fn output_path(&self, track: &Track, root: &Path, format: &str) -> PathBuf {
        let rendered = render(format, track);
        root.join(rendered.trim_start_matches('/'))
    }

    fn is_convertible(&self, track: &Track) -> bool {
        self.conversion.matches(&track.path)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn track_for(root: &Path, path: &Path) -> Track {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let lossy = |p: Option<&std::ffi::OsStr>| p.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();

    let dir = rel
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = lossy(rel.parent().and_then(Path::file_name));

    Track::new(path)
        .with_tag("dir", dir)
        .with_tag("parent", parent)
        .with_tag("stem", lossy(path.file_stem()))
        .with_tag("ext", lossy(path.extension()))
        .with_tag("filename", lossy(path.file_name()))
}

/// Replace reserved characters so a tag value stays one path component
pub fn escape(value: &str) -> String {
    value
        .chars()
        .map(|c| if RESERVED.contains(&c) { '-' } else { c })
        .collect()
}

/// Substitute `{token}`s in `format` with the track's tags
pub fn render(format: &str, track: &Track) -> String {
    let mut out = String::with_capacity(format.len() + 32);
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        match (name, track.tag(name)) {
            ("dir", Some(dir)) => out.push_str(dir),
            (_, Some(value)) => out.push_str(&escape(value)),
            (_, None) => out.push_str("unknown"),
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}
