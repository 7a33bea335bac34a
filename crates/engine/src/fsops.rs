//! Filesystem helpers shared by the decision engine and jobs

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// `true` only if both paths exist and `a` was modified strictly after `b`
///
/// Any error while stat'ing either path yields `false`.
pub fn newer(a: &Path, b: &Path) -> bool {
    match (modified(a), modified(b)) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Replace the extension of `path`, accepting `ext` with or without a leading dot
pub fn with_extension(path: &Path, ext: &str) -> PathBuf {
    path.with_extension(ext.trim_start_matches('.'))
}

/// Remove now-empty ancestor directories of `path`, stopping at `root`
///
/// Stops at the first directory that is not empty or cannot be removed.
/// Returns how many directories were removed.
pub fn prune_empty_ancestors(path: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut current = path.parent();

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if fs::remove_dir(dir).is_err() {
            break;
        }
        trace!(dir = %dir.display(), "Pruned empty directory");
        removed += 1;
        current = dir.parent();
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    #[test]
    fn test_newer_compares_mtimes() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("old.flac");
        let new = temp_dir.path().join("new.flac");
        fs::write(&old, b"a").unwrap();
        fs::write(&new, b"b").unwrap();
        set_file_mtime(&old, FileTime::from_unix_time(1_000, 0)).unwrap();
        set_file_mtime(&new, FileTime::from_unix_time(2_000, 0)).unwrap();

        assert!(newer(&new, &old));
        assert!(!newer(&old, &new));
        // Equal mtimes are not newer
        assert!(!newer(&new, &new));
    }

    #[test]
    fn test_newer_is_false_for_missing_paths() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present");
        fs::write(&present, b"x").unwrap();
        let missing = temp_dir.path().join("missing");

        assert!(!newer(&present, &missing));
        assert!(!newer(&missing, &present));
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension(Path::new("/d/a.flac"), "ogg"), PathBuf::from("/d/a.ogg"));
        assert_eq!(with_extension(Path::new("/d/a.flac"), ".mp3"), PathBuf::from("/d/a.mp3"));
        assert_eq!(with_extension(Path::new("/d/a"), "opus"), PathBuf::from("/d/a.opus"));
    }

    #[test]
    fn test_prune_stops_at_root_and_non_empty() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let deep = root.join("artist/album/disc1");
        fs::create_dir_all(&deep).unwrap();
        fs::write(root.join("artist/keep.txt"), b"x").unwrap();

        let removed = prune_empty_ancestors(&deep.join("track.flac"), root);
        assert_eq!(removed, 2);
        assert!(!root.join("artist/album").exists());
        assert!(root.join("artist").exists());

        // Never removes the root itself
        let top = root.join("top.flac");
        assert_eq!(prune_empty_ancestors(&top, root), 0);
        assert!(root.exists());
    }
}
