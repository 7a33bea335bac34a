//! Folder artwork lookup served from a background thread

use crossbeam_channel::{unbounded, Receiver, Sender};
use engine::{ArtworkProvider, ArtworkReply, Track};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

struct Lookup {
    dir: PathBuf,
    reply: ArtworkReply,
}

/// Finds cover images next to the source files
///
/// `names` are tried in order and matched case-insensitively against the
/// files of the track's directory. Lookups run on a dedicated thread and
/// answer asynchronously, like a host UI thread would.
pub struct FolderArtwork {
    sender: Option<Sender<Lookup>>,
    handle: Option<JoinHandle<()>>,
}

impl FolderArtwork {
    pub fn spawn(names: Vec<String>) -> std::io::Result<Self> {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("ows-artwork".to_string())
            .spawn(move || serve(receiver, names))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }
}

impl ArtworkProvider for FolderArtwork {
    fn request(&self, track: &Track, reply: ArtworkReply) {
        let Some(dir) = track.path.parent() else {
            reply.not_found();
            return;
        };
        let Some(sender) = &self.sender else {
            return;
        };
        // A failed send drops the reply, which answers "not found"
        let _ = sender.send(Lookup {
            dir: dir.to_path_buf(),
            reply,
        });
    }
}

impl Drop for FolderArtwork {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Artwork thread panicked");
            }
        }
    }
}

fn serve(receiver: Receiver<Lookup>, names: Vec<String>) {
    for Lookup { dir, reply } in receiver {
        match find_cover(&dir, &names) {
            Some(path) => {
                debug!(dir = %dir.display(), art = %path.display(), "Artwork found");
                reply.found(path);
            }
            None => {
                reply.not_found();
            }
        }
    }
}

/// First file in `dir` matching one of `names`, in priority order
pub fn find_cover(dir: &Path, names: &[String]) -> Option<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Cannot list artwork directory");
            return None;
        }
    };

    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .collect();

    names.iter().find_map(|name| {
        files
            .iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .cloned()
    })
}
