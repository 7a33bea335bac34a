//! End-to-end runs of the engine against in-memory hosts

use engine::{
    AbortFlag, ArtworkProvider, ArtworkReply, Callbacks, ConvertSettings, Job, JobEnv, Library,
    Mirror, RunStatus, SyncConfig, SyncError, TranscodeError, Transcoder, Track,
};
use filetime::{set_file_mtime, FileTime};
use ledger::Ledger;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Library whose destination is `root/<dir tag>/<file name>`
#[derive(Default)]
struct FakeLibrary {
    tracks: RwLock<Vec<Track>>,
    convertible: Vec<String>,
}

impl FakeLibrary {
    fn with_tracks(tracks: Vec<Track>) -> Arc<Self> {
        Arc::new(Self {
            tracks: RwLock::new(tracks),
            convertible: Vec::new(),
        })
    }

    fn converting(tracks: Vec<Track>, ext: &str) -> Arc<Self> {
        Arc::new(Self {
            tracks: RwLock::new(tracks),
            convertible: vec![ext.to_string()],
        })
    }

    fn set_tracks(&self, tracks: Vec<Track>) {
        *self.tracks.write() = tracks;
    }
}

impl Library for FakeLibrary {
    fn tracks(&self) -> Vec<Track> {
        self.tracks.read().clone()
    }

    fn output_path(&self, track: &Track, root: &Path, _format: &str) -> PathBuf {
        let name = track.path.file_name().unwrap();
        root.join(track.tag("dir").unwrap_or("")).join(name)
    }

    fn is_convertible(&self, track: &Track) -> bool {
        track
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.convertible.iter().any(|c| c == e))
    }
}

/// Copies the input and prefixes it with the preset name
#[derive(Default)]
struct FakeTranscoder {
    calls: AtomicUsize,
}

impl Transcoder for FakeTranscoder {
    fn transcode(
        &self,
        settings: &ConvertSettings,
        track: &Track,
        output: &Path,
        _abort: &AbortFlag,
    ) -> Result<(), TranscodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bytes = settings.preset.clone().into_bytes();
        bytes.extend(fs::read(&track.path)?);
        fs::write(output, bytes)?;
        Ok(())
    }
}

/// Signals when it starts, then blocks until aborted
struct BlockingTranscoder {
    started: Mutex<mpsc::Sender<()>>,
}

impl Transcoder for BlockingTranscoder {
    fn transcode(
        &self,
        _settings: &ConvertSettings,
        _track: &Track,
        output: &Path,
        abort: &AbortFlag,
    ) -> Result<(), TranscodeError> {
        fs::write(output, b"partial")?;
        let _ = self.started.lock().send(());
        while !abort.is_raised() {
            thread::sleep(Duration::from_millis(5));
        }
        fs::remove_file(output)?;
        Err(TranscodeError::Aborted)
    }
}

/// Answers with `folder.jpg` next to the track, if it exists
struct FolderArt;

impl ArtworkProvider for FolderArt {
    fn request(&self, track: &Track, reply: ArtworkReply) {
        let art = track.path.with_file_name("folder.jpg");
        if art.exists() {
            reply.found(art);
        } else {
            reply.not_found();
        }
    }
}

/// Never answers
#[derive(Default)]
struct SilentArt {
    replies: Mutex<Vec<ArtworkReply>>,
}

impl ArtworkProvider for SilentArt {
    fn request(&self, _track: &Track, reply: ArtworkReply) {
        self.replies.lock().push(reply);
    }
}

struct Fixture {
    _dir: TempDir,
    music: PathBuf,
    dest: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&music).unwrap();
        Self {
            _dir: dir,
            music,
            dest,
        }
    }

    /// Create a source file with an old mtime and return its track
    fn track(&self, rel: &str, dir: &str) -> Track {
        let path = self.music.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel.as_bytes()).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        Track::new(path).with_tag("dir", dir)
    }

    /// Track for an existing source, with a different destination directory
    fn track_without_touch(&self, rel: &str, dir: &str) -> Track {
        Track::new(self.music.join(rel)).with_tag("dir", dir)
    }

    fn config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.dest);
        config.workers = 2;
        config
    }
}

#[test]
fn second_run_without_changes_queues_nothing() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("a.flac", "x"), fx.track("b.mp3", "x"), fx.track("c.mp3", "y")];
    let mirror = Mirror::new(fx.config(), FakeLibrary::with_tracks(tracks));

    let first = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(first.generation, 1);
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.queue.queued, 3);
    assert_eq!(first.execution.succeeded, 3);
    assert_eq!(fs::read(fx.dest.join("y/c.mp3")).unwrap(), b"c.mp3");

    let second = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(second.queue.queued, 0);
    assert_eq!(second.queue.skipped, 3);
    assert_eq!(second.execution.total(), 0);
}

#[test]
fn relocated_destination_is_moved_not_recopied() {
    let fx = Fixture::new();
    let library = FakeLibrary::with_tracks(vec![fx.track("a.flac", "old/album")]);
    let mirror = Mirror::new(fx.config(), library.clone());
    mirror.run(false, &Callbacks::default()).unwrap();

    library.set_tracks(vec![fx.track_without_touch("a.flac", "new/album")]);
    let moves = Arc::new(AtomicUsize::new(0));
    let callbacks = Callbacks {
        on_job_queued: Some(Box::new({
            let moves = Arc::clone(&moves);
            move |job| {
                if job.spec().kind() == "move" {
                    moves.fetch_add(1, Ordering::SeqCst);
                }
            }
        })),
        ..Callbacks::default()
    };

    let report = mirror.run(false, &callbacks).unwrap();
    assert_eq!(report.queue.queued, 1);
    assert_eq!(moves.load(Ordering::SeqCst), 1);
    assert!(fx.dest.join("new/album/a.flac").exists());
    assert!(!fx.dest.join("old").exists());

    drop(mirror);
    let ledger = Ledger::open(&fx.dest).unwrap();
    let history = ledger.history(&fx.music.join("a.flac")).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[1].is_tombstone());
    assert_eq!(history[2].destination(), Some(fx.dest.join("new/album/a.flac").as_path()));
}

#[test]
fn preset_change_reconverts_and_removes_old_artifact() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("a.flac", "x")];
    let transcoder = Arc::new(FakeTranscoder::default());

    let mut config = fx.config();
    config.workers = 1;
    config.conversion.preset = "A".into();
    config.conversion.extension = "ogg".into();
    {
        let mirror = Mirror::new(config.clone(), FakeLibrary::converting(tracks.clone(), "flac"))
            .with_transcoder(transcoder.clone());
        mirror.run(false, &Callbacks::default()).unwrap();
    }
    assert!(fs::read(fx.dest.join("x/a.ogg")).unwrap().starts_with(b"A"));

    config.conversion.preset = "B".into();
    config.conversion.extension = "opus".into();
    let mirror = Mirror::new(config, FakeLibrary::converting(tracks, "flac"))
        .with_transcoder(transcoder.clone());
    let report = mirror.run(false, &Callbacks::default()).unwrap();

    assert_eq!(report.queue.queued, 2);
    assert_eq!(report.execution.succeeded, 2);
    assert!(!fx.dest.join("x/a.ogg").exists());
    assert!(fs::read(fx.dest.join("x/a.opus")).unwrap().starts_with(b"B"));
    assert_eq!(transcoder.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn conversion_without_transcoder_is_reported_not_queued() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("a.flac", "x"), fx.track("b.mp3", "x")];
    let mirror = Mirror::new(fx.config(), FakeLibrary::converting(tracks, "flac"));

    let report = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(report.queue.conversion_unavailable, 1);
    assert_eq!(report.queue.queued, 1);
    assert!(fx.dest.join("x/b.mp3").exists());
}

#[test]
fn dry_run_matches_live_run_without_side_effects() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("a.flac", "x"), fx.track("b.flac", "y")];
    let library = FakeLibrary::with_tracks(tracks);

    let queued = Arc::new(Mutex::new(Vec::new()));
    let callbacks = Callbacks {
        on_job_queued: Some(Box::new({
            let queued = Arc::clone(&queued);
            move |job| queued.lock().push(job.spec())
        })),
        ..Callbacks::default()
    };

    let dry = {
        let mirror = Mirror::new(fx.config(), library.clone());
        mirror.run(true, &callbacks).unwrap()
    };
    assert_eq!(dry.generation, 0);
    assert!(dry.dry);
    assert_eq!(dry.execution.succeeded, 2);
    assert!(!fx.dest.exists());
    let dry_jobs = std::mem::take(&mut *queued.lock());

    let mirror = Mirror::new(fx.config(), library);
    let live = mirror.run(false, &callbacks).unwrap();
    assert_eq!(live.queue, dry.queue);
    assert_eq!(*queued.lock(), dry_jobs);
    assert!(fx.dest.join("x/a.flac").exists());
}

#[test]
fn dry_run_on_synced_root_writes_no_records() {
    let fx = Fixture::new();
    let library = FakeLibrary::with_tracks(vec![fx.track("a.flac", "x")]);
    let mirror = Mirror::new(fx.config(), library.clone());
    mirror.run(false, &Callbacks::default()).unwrap();

    library.set_tracks(vec![fx.track_without_touch("a.flac", "z"), fx.track("b.flac", "x")]);
    let report = mirror.run(true, &Callbacks::default()).unwrap();
    assert_eq!(report.queue.queued, 2);
    assert!(fx.dest.join("x/a.flac").exists());
    assert!(!fx.dest.join("z").exists());
    assert!(!fx.dest.join("x/b.flac").exists());

    drop(mirror);
    let ledger = Ledger::open(&fx.dest).unwrap();
    assert_eq!(ledger.record_count(), 1);
    assert_eq!(ledger.generations().unwrap().len(), 1);
}

#[test]
fn cancel_aborts_running_conversion_and_drains_queue() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("a.flac", "x"), fx.track("b.flac", "x"), fx.track("c.flac", "x")];
    let (tx, rx) = mpsc::channel();

    let mut config = fx.config();
    config.workers = 1;
    let mirror = Arc::new(
        Mirror::new(config, FakeLibrary::converting(tracks, "flac")).with_transcoder(Arc::new(
            BlockingTranscoder {
                started: Mutex::new(tx),
            },
        )),
    );

    let runner = {
        let mirror = Arc::clone(&mirror);
        thread::spawn(move || mirror.run(false, &Callbacks::default()))
    };

    rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert!(matches!(
        mirror.run(false, &Callbacks::default()),
        Err(SyncError::AlreadyRunning)
    ));

    mirror.cancel();
    assert_eq!(mirror.queue().size(), 0);
    assert_eq!(mirror.active_workers(), 0);

    let report = runner.join().unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.queue.queued, 3);
    assert_eq!(report.execution.aborted, 1);
    assert_eq!(report.execution.succeeded, 0);
    assert!(!fx.dest.join("x/a.ogg").exists());
    assert!(!mirror.is_running());
}

#[test]
fn cover_is_copied_once_per_directory() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("album/a.flac", "album"), fx.track("album/b.flac", "album")];
    let art = fx.music.join("album/folder.jpg");
    fs::write(&art, b"jpeg").unwrap();
    set_file_mtime(&art, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let mut config = fx.config();
    config.cover.enabled = true;
    let gathered = Arc::new(Mutex::new(Vec::new()));
    let callbacks = Callbacks {
        on_sources_gathered: Some(Box::new({
            let gathered = Arc::clone(&gathered);
            move |n| gathered.lock().push(n)
        })),
        ..Callbacks::default()
    };

    let mirror =
        Mirror::new(config, FakeLibrary::with_tracks(tracks)).with_artwork(Arc::new(FolderArt));
    let report = mirror.run(false, &callbacks).unwrap();

    assert_eq!(report.queue.cover_lookups, 1);
    assert_eq!(report.queue.queued, 3);
    assert_eq!(fs::read(fx.dest.join("album/cover.jpg")).unwrap(), b"jpeg");
    assert_eq!(*gathered.lock(), vec![2, 3]);

    let again = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(again.queue.queued, 0);
}

#[test]
fn missing_source_still_gets_its_directory_cover() {
    let fx = Fixture::new();
    fs::create_dir_all(fx.music.join("album")).unwrap();
    let art = fx.music.join("album/folder.jpg");
    fs::write(&art, b"jpeg").unwrap();
    let missing = Track::new(fx.music.join("album/gone.flac")).with_tag("dir", "album");

    let mut config = fx.config();
    config.cover.enabled = true;
    let mirror =
        Mirror::new(config, FakeLibrary::with_tracks(vec![missing])).with_artwork(Arc::new(FolderArt));
    let report = mirror.run(false, &Callbacks::default()).unwrap();

    assert_eq!(report.queue.missing_sources, 1);
    assert_eq!(report.queue.cover_lookups, 1);
    assert_eq!(report.queue.queued, 1);
    assert_eq!(fs::read(fx.dest.join("album/cover.jpg")).unwrap(), b"jpeg");

    drop(mirror);
    let ledger = Ledger::open(&fx.dest).unwrap();
    assert!(ledger.is_seen(&art).unwrap());
}

#[test]
fn dry_run_does_not_register_artwork() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("album/a.flac", "album")];
    let art = fx.music.join("album/folder.jpg");
    fs::write(&art, b"jpeg").unwrap();

    let mut config = fx.config();
    config.cover.enabled = true;
    let live = Mirror::new(config.clone(), FakeLibrary::with_tracks(tracks.clone()));
    live.run(false, &Callbacks::default()).unwrap();
    drop(live);

    let dry = Mirror::new(config, FakeLibrary::with_tracks(tracks)).with_artwork(Arc::new(FolderArt));
    let report = dry.run(true, &Callbacks::default()).unwrap();
    assert_eq!(report.queue.cover_lookups, 1);
    assert!(!fx.dest.join("album/cover.jpg").exists());

    drop(dry);
    let ledger = Ledger::open(&fx.dest).unwrap();
    assert!(!ledger.is_seen(&art).unwrap());
}

#[test]
fn pending_jobs_block_a_new_run() {
    let fx = Fixture::new();
    let source = fx.track("a.flac", "x");
    let mirror = Mirror::new(fx.config(), FakeLibrary::with_tracks(vec![source.clone()]));

    let env = JobEnv {
        ledger: Arc::new(Ledger::temporary(&fx.dest).unwrap()),
        generation: 0,
        root: fx.dest.clone(),
    };
    mirror.queue().open();
    assert!(mirror
        .queue()
        .push(Job::copy(&env, source.path.clone(), fx.dest.join("x/a.flac"))));

    let err = mirror.run(false, &Callbacks::default()).unwrap_err();
    assert!(matches!(err, SyncError::QueueBusy(1)));
    assert!(!mirror.is_running());
    assert!(!Ledger::exists(&fx.dest));

    assert_eq!(mirror.queue().cancel(), 1);
    let report = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.queue.queued, 1);
    assert!(fx.dest.join("x/a.flac").exists());
}

#[test]
fn cover_lookup_timeout_queues_no_cover_job() {
    let fx = Fixture::new();
    let tracks = vec![fx.track("album/a.flac", "album")];
    let artwork = Arc::new(SilentArt::default());

    let mut config = fx.config();
    config.cover.enabled = true;
    config.cover.timeout_ms = 50;
    let mirror = Mirror::new(config, FakeLibrary::with_tracks(tracks)).with_artwork(artwork.clone());

    let report = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(report.queue.cover_timeouts, 1);
    assert_eq!(report.queue.queued, 1);
    assert!(!fx.dest.join("album/cover.jpg").exists());

    // A late answer is ignored without panicking
    let reply = artwork.replies.lock().pop().unwrap();
    assert!(!reply.found(fx.music.join("album/folder.jpg")));
}

#[test]
fn removed_sources_are_cleaned_up_when_enabled() {
    let fx = Fixture::new();
    let keep = fx.track("keep.flac", "x");
    let gone = fx.track("gone.flac", "x");
    let library = FakeLibrary::with_tracks(vec![keep.clone(), gone.clone()]);

    let mut config = fx.config();
    config.remove_unreferenced = true;
    let mirror = Mirror::new(config, library.clone());
    mirror.run(false, &Callbacks::default()).unwrap();
    assert!(fx.dest.join("x/gone.flac").exists());

    library.set_tracks(vec![keep]);
    let report = mirror.run(false, &Callbacks::default()).unwrap();
    assert_eq!(report.queue.unreferenced, 1);
    assert!(!fx.dest.join("x/gone.flac").exists());
    assert!(fx.dest.join("x/keep.flac").exists());

    drop(mirror);
    let ledger = Ledger::open(&fx.dest).unwrap();
    assert!(ledger.latest_record(&gone.path).unwrap().is_tombstone());
}

#[test]
fn missing_and_duplicate_sources() {
    let fx = Fixture::new();
    let a = fx.track("a.flac", "x");
    let missing = Track::new(fx.music.join("missing.flac"));
    let library = FakeLibrary::with_tracks(vec![a.clone(), missing, a]);

    let finished = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(usize::MAX));
    let callbacks = Callbacks {
        on_job_finished: Some(Box::new({
            let finished = Arc::clone(&finished);
            move |_, ok| {
                assert!(ok);
                finished.fetch_add(1, Ordering::SeqCst);
            }
        })),
        on_queueing_complete: Some(Box::new({
            let completed = Arc::clone(&completed);
            move |n| completed.store(n, Ordering::SeqCst)
        })),
        ..Callbacks::default()
    };

    let report = Mirror::new(fx.config(), library).run(false, &callbacks).unwrap();
    assert_eq!(report.queue.sources, 2);
    assert_eq!(report.queue.missing_sources, 1);
    assert_eq!(report.queue.queued, 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_config_aborts_before_queueing() {
    let fx = Fixture::new();
    let mut config = fx.config();
    config.workers = 0;

    let err = Mirror::new(config, FakeLibrary::with_tracks(vec![fx.track("a.flac", "x")]))
        .run(false, &Callbacks::default())
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidConfig { field: "sync.workers", .. }));
    assert!(!fx.dest.exists());
}
