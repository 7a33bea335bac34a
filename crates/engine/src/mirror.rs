//! Run orchestration: queueing phase, execution phase, cancellation
//!
//! A run is `begin` -> `queue_jobs` -> `execute`. [`Mirror::run`] does all
//! three. [`Mirror::cancel`] may be called from any other thread at any time.

use crate::cancel::CancellationToken;
use crate::config::SyncConfig;
use crate::cover::{ArtworkProvider, CoverOutcome, CoverResolver};
use crate::decision::{decide, decide_cover, JobSpec, SkipReason};
use crate::error::{Result, SyncError};
use crate::job::{Job, JobEnv, JobOutcome};
use crate::pool::{ExecutionReport, ExecutionStats, WorkerGroup};
use crate::queue::JobQueue;
use crate::source::{Library, Track};
use crate::transcode::{AbortFlag, ConvertSettings, Transcoder};
use ledger::{Ledger, DRY_RUN_GENERATION};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Optional progress hooks, invoked on whichever thread reaches that point
///
/// Hooks must not call [`Mirror::cancel`] from `on_job_finished`; cancel
/// waits for workers, including the one running the hook. `on_job_queued`
/// fires only for jobs the queue accepted, under the queue lock, so it must
/// not call `cancel` either.
#[derive(Default)]
pub struct Callbacks {
    /// Number of units to process: sources, plus scheduled cover lookups
    pub on_sources_gathered: Option<Box<dyn Fn(usize) + Send + Sync>>,
    pub on_job_queued: Option<Box<dyn Fn(&Job) + Send + Sync>>,
    /// Final number of queued jobs
    pub on_queueing_complete: Option<Box<dyn Fn(usize) + Send + Sync>>,
    pub on_job_finished: Option<Box<dyn Fn(&Job, bool) + Send + Sync>>,
}

impl Callbacks {
    fn sources_gathered(&self, count: usize) {
        if let Some(cb) = &self.on_sources_gathered {
            cb(count);
        }
    }

    fn job_queued(&self, job: &Job) {
        if let Some(cb) = &self.on_job_queued {
            cb(job);
        }
    }

    fn queueing_complete(&self, count: usize) {
        if let Some(cb) = &self.on_queueing_complete {
            cb(count);
        }
    }

    fn job_finished(&self, job: &Job, success: bool) {
        if let Some(cb) = &self.on_job_finished {
            cb(job, success);
        }
    }
}

/// Everything one run shares between its phases
#[derive(Clone)]
pub struct RunContext {
    pub ledger: Arc<Ledger>,
    /// `0` for dry runs
    pub generation: u64,
    pub dry: bool,
    pub token: CancellationToken,
}

impl RunContext {
    fn env(&self) -> JobEnv {
        JobEnv {
            ledger: Arc::clone(&self.ledger),
            generation: self.generation,
            root: self.ledger.root().to_path_buf(),
        }
    }
}

/// What the queueing phase saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    /// Distinct sources considered
    pub sources: usize,
    pub queued: usize,
    pub skipped: usize,
    pub missing_sources: usize,
    pub conversion_unavailable: usize,
    pub cover_lookups: usize,
    pub cover_timeouts: usize,
    /// Delete jobs queued for artifacts whose source is gone
    pub unreferenced: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePhase {
    pub report: QueueReport,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub generation: u64,
    pub dry: bool,
    pub status: RunStatus,
    pub queue: QueueReport,
    pub execution: ExecutionReport,
}

/// One-way mirror of a library into `config.root`
pub struct Mirror {
    config: SyncConfig,
    library: Arc<dyn Library>,
    transcoder: Option<Arc<dyn Transcoder>>,
    artwork: Option<Arc<dyn ArtworkProvider>>,
    queue: JobQueue<Job>,
    /// Ledger kept open across runs of this mirror
    ledger: Mutex<Option<Arc<Ledger>>>,
    token: Mutex<CancellationToken>,
    workers: WorkerGroup,
    running: AtomicBool,
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Mirror {
    pub fn new(config: SyncConfig, library: Arc<dyn Library>) -> Self {
        Self {
            config,
            library,
            transcoder: None,
            artwork: None,
            queue: JobQueue::new(),
            ledger: Mutex::new(None),
            token: Mutex::new(CancellationToken::new()),
            workers: WorkerGroup::default(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn with_artwork(mut self, artwork: Arc<dyn ArtworkProvider>) -> Self {
        self.artwork = Some(artwork);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue<Job> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Worker threads currently executing jobs
    pub fn active_workers(&self) -> usize {
        self.workers.active()
    }

    /// Run both phases to completion or cancellation
    pub fn run(&self, dry: bool, callbacks: &Callbacks) -> Result<RunReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);

        let ctx = self.begin(dry)?;
        let phase = self.queue_jobs(&ctx, callbacks)?;
        let execution = self.execute(&ctx, callbacks)?;

        if let Err(e) = ctx.ledger.flush() {
            warn!(error = %e, "Could not flush ledger");
        }

        let status = if phase.cancelled || ctx.token.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        info!(
            generation = ctx.generation,
            dry,
            status = ?status,
            queued = phase.report.queued,
            succeeded = execution.succeeded,
            failed = execution.failed,
            aborted = execution.aborted,
            "Sync finished"
        );

        Ok(RunReport {
            generation: ctx.generation,
            dry,
            status,
            queue: phase.report,
            execution,
        })
    }

    /// Validate configuration, open the ledger and start a generation
    ///
    /// Dry runs use generation `0` and never create a generation record.
    pub fn begin(&self, dry: bool) -> Result<RunContext> {
        self.config.validate()?;

        let pending = self.queue.size();
        if pending > 0 {
            return Err(SyncError::QueueBusy(pending));
        }

        let ledger = self.ledger(dry)?;
        let generation = if dry {
            DRY_RUN_GENERATION
        } else {
            ledger
                .begin_generation(
                    &self.config.filename_format,
                    self.config.cover.enabled,
                    self.config
                        .cover
                        .enabled
                        .then_some(self.config.cover.filename.as_str()),
                    self.config.remove_unreferenced,
                )
                .map_err(SyncError::GenerationCreateFailed)?
        };

        let token = CancellationToken::new();
        *self.token.lock() = token.clone();

        Ok(RunContext {
            ledger,
            generation,
            dry,
            token,
        })
    }

    fn ledger(&self, dry: bool) -> Result<Arc<Ledger>> {
        let mut cached = self.ledger.lock();
        if let Some(ledger) = cached.as_ref() {
            return Ok(Arc::clone(ledger));
        }

        let root = &self.config.root;
        // Previewing a root that was never synced must not create a store
        if dry && !Ledger::exists(root) {
            return Ledger::temporary(root)
                .map(Arc::new)
                .map_err(SyncError::LedgerUnavailable);
        }

        let ledger = Arc::new(Ledger::open(root).map_err(SyncError::LedgerUnavailable)?);
        *cached = Some(Arc::clone(&ledger));
        Ok(ledger)
    }

    /// Walk the library once and queue every decided job, then close the queue
    pub fn queue_jobs(&self, ctx: &RunContext, callbacks: &Callbacks) -> Result<QueuePhase> {
        let pending = self.queue.size();
        if pending > 0 {
            return Err(SyncError::QueueBusy(pending));
        }
        self.queue.open();

        let env = ctx.env();
        let settings = self
            .transcoder
            .as_ref()
            .map(|_| self.config.conversion.settings());

        let tracks = self.library.tracks();
        callbacks.sources_gathered(tracks.len());
        debug!(sources = tracks.len(), generation = ctx.generation, "Gathered sources");

        let mut report = QueueReport::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut cover_dirs: Vec<(PathBuf, Track)> = Vec::new();
        let mut cover_seen: HashSet<PathBuf> = HashSet::new();
        let mut cancelled = false;

        for track in &tracks {
            if ctx.token.is_cancelled() {
                cancelled = true;
                break;
            }
            if !visited.insert(track.path.clone()) {
                continue;
            }
            report.sources += 1;

            let to = self
                .library
                .output_path(track, &self.config.root, &self.config.filename_format);

            if track.path.exists() {
                self.queue_source(&env, ctx, track, &to, settings.as_ref(), callbacks, &mut report);
            } else {
                error!(source = %track.path.display(), "Source file does not exist, skipping");
                report.missing_sources += 1;
            }

            // The target directory still gets a cover when its source is missing
            if self.config.cover.enabled {
                let dir = to.parent().map(Path::to_path_buf).unwrap_or_default();
                if cover_seen.insert(dir.clone()) {
                    cover_dirs.push((dir, track.clone()));
                    callbacks.sources_gathered(tracks.len() + cover_dirs.len());
                }
            }
        }

        if !cancelled {
            cancelled = self.queue_covers(&env, ctx, &cover_dirs, callbacks, &mut report);
        }
        if !cancelled && self.config.remove_unreferenced {
            self.queue_unreferenced(&env, ctx, &visited, callbacks, &mut report);
        }

        self.queue.close();
        callbacks.queueing_complete(report.queued);
        info!(
            generation = ctx.generation,
            sources = report.sources,
            queued = report.queued,
            cancelled,
            "Queueing complete"
        );

        Ok(QueuePhase { report, cancelled })
    }

    /// Decide and queue the jobs for one existing source
    #[allow(clippy::too_many_arguments)]
    fn queue_source(
        &self,
        env: &JobEnv,
        ctx: &RunContext,
        track: &Track,
        to: &Path,
        settings: Option<&ConvertSettings>,
        callbacks: &Callbacks,
        report: &mut QueueReport,
    ) {
        let old = ctx.ledger.latest_record(&track.path);
        let decision = decide(
            &track.path,
            to,
            old.as_ref(),
            self.library.is_convertible(track),
            settings,
            &self.config.conversion.extension,
        );

        match decision.skip {
            Some(SkipReason::ConversionUnavailable) => {
                warn!(source = %track.path.display(), "{}", SkipReason::ConversionUnavailable);
                report.conversion_unavailable += 1;
            }
            Some(reason) => {
                debug!(source = %track.path.display(), "Skipping: {reason}");
                report.skipped += 1;
            }
            None => {}
        }

        if decision.jobs.is_empty() && !ctx.dry {
            if let Err(e) = ctx.ledger.register_seen(&track.path) {
                warn!(source = %track.path.display(), error = %e, "Could not register source");
            }
        }

        for spec in decision.jobs {
            self.enqueue(env, ctx, spec, Some(track), settings, callbacks, report);
        }
    }

    /// Look up artwork once per destination directory; returns `true` if cancelled
    fn queue_covers(
        &self,
        env: &JobEnv,
        ctx: &RunContext,
        cover_dirs: &[(PathBuf, Track)],
        callbacks: &Callbacks,
        report: &mut QueueReport,
    ) -> bool {
        if cover_dirs.is_empty() {
            return false;
        }
        let Some(provider) = &self.artwork else {
            for (dir, _) in cover_dirs {
                warn!(dir = %dir.display(), "Cover sync enabled but no artwork provider available");
            }
            return false;
        };

        let resolver = CoverResolver::new(
            Arc::clone(provider),
            Duration::from_millis(self.config.cover.timeout_ms),
        );

        for (dir, track) in cover_dirs {
            if ctx.token.is_cancelled() {
                return true;
            }

            report.cover_lookups += 1;
            let art = match resolver.lookup(track) {
                CoverOutcome::Found(art) => art,
                CoverOutcome::NotFound => continue,
                CoverOutcome::TimedOut => {
                    report.cover_timeouts += 1;
                    continue;
                }
            };
            if !art.exists() {
                warn!(art = %art.display(), "Artwork provider returned a missing file");
                continue;
            }
            if !ctx.dry {
                if let Err(e) = ctx.ledger.register_seen(&art) {
                    warn!(art = %art.display(), error = %e, "Could not register artwork");
                }
            }

            let to = dir.join(&self.config.cover.filename);
            let old = ctx.ledger.latest_record(&art);
            match decide_cover(&art, &to, old.as_ref()) {
                Some(spec) => {
                    self.enqueue(env, ctx, spec, None, None, callbacks, report);
                }
                None => debug!(art = %art.display(), "Skipping: {}", SkipReason::DestinationCurrent),
            }
        }

        false
    }

    /// Delete live artifacts whose source was not seen in this run
    fn queue_unreferenced(
        &self,
        env: &JobEnv,
        ctx: &RunContext,
        visited: &HashSet<PathBuf>,
        callbacks: &Callbacks,
        report: &mut QueueReport,
    ) {
        let cover_name = self
            .config
            .cover
            .enabled
            .then_some(self.config.cover.filename.as_str());

        for record in ctx.ledger.live_artifacts() {
            let Some(dest) = record.destination() else {
                continue;
            };
            if visited.contains(&record.source) || !dest.exists() {
                continue;
            }
            if cover_name.is_some_and(|name| dest.file_name().is_some_and(|f| f == name)) {
                continue;
            }

            let spec = JobSpec::Delete {
                source: record.source.clone(),
                target: dest.to_path_buf(),
            };
            info!(source = %record.source.display(), "Source no longer present, removing its artifact");
            if self.enqueue(env, ctx, spec, None, None, callbacks, report) {
                report.unreferenced += 1;
            }
        }
    }

    /// Bind a spec to this run and push it; returns whether it was queued
    #[allow(clippy::too_many_arguments)]
    fn enqueue(
        &self,
        env: &JobEnv,
        ctx: &RunContext,
        spec: JobSpec,
        track: Option<&Track>,
        settings: Option<&ConvertSettings>,
        callbacks: &Callbacks,
        report: &mut QueueReport,
    ) -> bool {
        let job = match spec {
            JobSpec::Copy { from, to } => Job::copy(env, from, to),
            JobSpec::Move {
                source,
                from,
                to,
                transform,
            } => Job::move_artifact(env, source, from, to, transform),
            JobSpec::Delete { source, target } => Job::delete(env, source, target),
            JobSpec::Convert { from, to } => {
                let (Some(track), Some(settings), Some(transcoder)) =
                    (track, settings, self.transcoder.as_ref())
                else {
                    error!(source = %from.display(), "Conversion decided without a transcoder");
                    return false;
                };
                Job::convert(
                    env,
                    track.clone(),
                    to,
                    settings.clone(),
                    Arc::clone(transcoder),
                    AbortFlag::linked(&ctx.token),
                )
            }
        };

        let spec = job.spec();
        if !self.queue.push_with(job, |job| callbacks.job_queued(job)) {
            debug!(job = %spec, "Queue closed, dropping job");
            return false;
        }
        report.queued += 1;
        true
    }

    /// Drain the queue with the configured number of worker threads
    pub fn execute(&self, ctx: &RunContext, callbacks: &Callbacks) -> Result<ExecutionReport> {
        let stats = ExecutionStats::default();
        let wanted = self.config.workers.max(1);

        let spawned = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(wanted);
            for index in 0..wanted {
                let active = self.workers.enter();
                let stats = &stats;
                let spawn = thread::Builder::new()
                    .name(format!("ows-worker-{index}"))
                    .spawn_scoped(scope, move || {
                        let _active = active;
                        self.work(ctx, callbacks, stats);
                    });
                match spawn {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!(error = %e, index, "Could not spawn worker");
                        if handles.is_empty() {
                            return Err(e);
                        }
                        break;
                    }
                }
            }

            let spawned = handles.len();
            debug!(workers = spawned, "Workers started");
            for handle in handles {
                if handle.join().is_err() {
                    error!("Worker thread panicked");
                }
            }
            Ok(spawned)
        });

        if let Err(e) = spawned {
            self.queue.cancel();
            return Err(SyncError::WorkerSpawn(e));
        }

        Ok(stats.report())
    }

    fn work(&self, ctx: &RunContext, callbacks: &Callbacks, stats: &ExecutionStats) {
        while let Some(mut job) = self.queue.pop() {
            let outcome = if ctx.token.is_cancelled() {
                job.abort();
                JobOutcome::Aborted
            } else {
                job.execute(ctx.dry)
            };
            stats.record(outcome);
            callbacks.job_finished(&job, outcome.is_success());
        }
    }

    /// Stop the current run: cancel the token, discard pending jobs and wait
    /// for every worker to return
    pub fn cancel(&self) {
        self.token.lock().cancel();
        let discarded = self.queue.cancel();
        info!(discarded, "Sync cancelled");
        self.workers.wait_idle();
    }
}
