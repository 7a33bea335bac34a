//! Jobs: one filesystem action plus its ledger bookkeeping
//!
//! State machine: `Pending -> Running -> {Succeeded, Failed, Aborted}`.
//! A job writes ledger records only after its filesystem action succeeded.

use crate::decision::JobSpec;
use crate::fsops::prune_empty_ancestors;
use crate::source::Track;
use crate::transcode::{AbortFlag, ConvertSettings, TranscodeError, Transcoder};
use ledger::{now_secs, Ledger, LedgerError, SyncRecord};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Per-job failure; logged and counted, never propagated out of a run
#[derive(Debug, Error)]
pub enum JobError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger write failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transcode(TranscodeError),

    #[error("job aborted")]
    Aborted,
}

impl JobError {
    fn io<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<TranscodeError> for JobError {
    fn from(e: TranscodeError) -> Self {
        match e {
            TranscodeError::Aborted => Self::Aborted,
            other => Self::Transcode(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

/// Final result of executing a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Aborted,
}

impl JobOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

/// What every job of one run shares
#[derive(Clone)]
pub struct JobEnv {
    pub ledger: Arc<Ledger>,
    pub generation: u64,
    /// Destination root; directory pruning never goes above it
    pub root: PathBuf,
}

enum JobKind {
    Copy {
        from: PathBuf,
        to: PathBuf,
    },
    Move {
        source: PathBuf,
        from: PathBuf,
        to: PathBuf,
        transform: Option<String>,
    },
    Convert {
        track: Track,
        to: PathBuf,
        settings: ConvertSettings,
        transcoder: Arc<dyn Transcoder>,
        abort: AbortFlag,
    },
    Delete {
        source: PathBuf,
        target: PathBuf,
    },
}

/// A unit of work bound to a specific filesystem action
pub struct Job {
    kind: JobKind,
    generation: u64,
    ledger: Arc<Ledger>,
    root: PathBuf,
    state: JobState,
}

impl Job {
    fn new(env: &JobEnv, kind: JobKind) -> Self {
        Self {
            kind,
            generation: env.generation,
            ledger: Arc::clone(&env.ledger),
            root: env.root.clone(),
            state: JobState::Pending,
        }
    }

    /// Copy `from` verbatim to `to`
    pub fn copy(env: &JobEnv, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::new(
            env,
            JobKind::Copy {
                from: from.into(),
                to: to.into(),
            },
        )
    }

    /// Rename the artifact `from` of `source` to `to`
    pub fn move_artifact(
        env: &JobEnv,
        source: impl Into<PathBuf>,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        transform: Option<String>,
    ) -> Self {
        Self::new(
            env,
            JobKind::Move {
                source: source.into(),
                from: from.into(),
                to: to.into(),
                transform,
            },
        )
    }

    /// Transcode `track` into `to`
    pub fn convert(
        env: &JobEnv,
        track: Track,
        to: impl Into<PathBuf>,
        settings: ConvertSettings,
        transcoder: Arc<dyn Transcoder>,
        abort: AbortFlag,
    ) -> Self {
        Self::new(
            env,
            JobKind::Convert {
                track,
                to: to.into(),
                settings,
                transcoder,
                abort,
            },
        )
    }

    /// Remove the artifact `target` produced for `source`
    pub fn delete(env: &JobEnv, source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::new(
            env,
            JobKind::Delete {
                source: source.into(),
                target: target.into(),
            },
        )
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn from(&self) -> &Path {
        match &self.kind {
            JobKind::Copy { from, .. } | JobKind::Move { from, .. } => from,
            JobKind::Convert { track, .. } => &track.path,
            JobKind::Delete { source, .. } => source,
        }
    }

    /// Destination; for Delete the path being removed
    pub fn to(&self) -> &Path {
        match &self.kind {
            JobKind::Copy { to, .. } | JobKind::Move { to, .. } | JobKind::Convert { to, .. } => to,
            JobKind::Delete { target, .. } => target,
        }
    }

    pub fn spec(&self) -> JobSpec {
        match &self.kind {
            JobKind::Copy { from, to } => JobSpec::Copy {
                from: from.clone(),
                to: to.clone(),
            },
            JobKind::Move {
                source,
                from,
                to,
                transform,
            } => JobSpec::Move {
                source: source.clone(),
                from: from.clone(),
                to: to.clone(),
                transform: transform.clone(),
            },
            JobKind::Convert { track, to, .. } => JobSpec::Convert {
                from: track.path.clone(),
                to: to.clone(),
            },
            JobKind::Delete { source, target } => JobSpec::Delete {
                source: source.clone(),
                target: target.clone(),
            },
        }
    }

    /// Request cooperative abort; only a conversion can be interrupted
    pub fn abort(&self) {
        if let JobKind::Convert { abort, .. } = &self.kind {
            abort.raise();
        }
    }

    /// Run the job, returning `true` on success
    pub fn run(&mut self, dry: bool) -> bool {
        self.execute(dry).is_success()
    }

    /// Run the job; a dry run only logs the intended action
    pub fn execute(&mut self, dry: bool) -> JobOutcome {
        if self.state != JobState::Pending {
            warn!(job = %self.spec(), state = ?self.state, "Job already executed");
            return JobOutcome::Failed;
        }

        self.state = JobState::Running;
        info!(generation = self.generation, "{}", self.describe());

        if dry {
            self.state = JobState::Succeeded;
            return JobOutcome::Succeeded;
        }

        let (state, outcome) = match self.perform() {
            Ok(()) => {
                debug!(job = %self.spec(), "Job succeeded");
                (JobState::Succeeded, JobOutcome::Succeeded)
            }
            Err(JobError::Aborted) => {
                info!(job = %self.spec(), "Job aborted");
                (JobState::Aborted, JobOutcome::Aborted)
            }
            Err(e) => {
                error!(job = %self.spec(), error = %e, "Job failed");
                (JobState::Failed, JobOutcome::Failed)
            }
        };

        self.state = state;
        outcome
    }

    fn describe(&self) -> String {
        match &self.kind {
            JobKind::Copy { from, to } => {
                format!("Copying {} to {}", from.display(), to.display())
            }
            JobKind::Move { from, to, .. } => {
                format!("Moving {} to {}", from.display(), to.display())
            }
            JobKind::Convert {
                track,
                to,
                settings,
                ..
            } => format!(
                "Converting {} to {} with preset {}",
                track.path.display(),
                to.display(),
                settings.preset
            ),
            JobKind::Delete { target, .. } => format!("Deleting {}", target.display()),
        }
    }

    fn perform(&self) -> Result<(), JobError> {
        match &self.kind {
            JobKind::Copy { from, to } => {
                create_parent(to)?;
                fs::copy(from, to).map_err(JobError::io("copy", from))?;
                self.ledger
                    .append(&SyncRecord::artifact(self.generation, from, to, None))?;
            }

            JobKind::Move {
                source,
                from,
                to,
                transform,
            } => {
                create_parent(to)?;
                fs::rename(from, to).map_err(JobError::io("rename", from))?;

                let now = now_secs();
                self.ledger
                    .append(&SyncRecord::tombstone(self.generation, source).at(now))?;
                self.ledger.append(
                    &SyncRecord::artifact(self.generation, source, to, transform.clone()).at(now),
                )?;
                prune_empty_ancestors(from, &self.root);
            }

            JobKind::Convert {
                track,
                to,
                settings,
                transcoder,
                abort,
            } => {
                if abort.is_raised() {
                    return Err(JobError::Aborted);
                }
                create_parent(to)?;
                transcoder.transcode(settings, track, to, abort)?;
                self.ledger.append(&SyncRecord::artifact(
                    self.generation,
                    &track.path,
                    to,
                    Some(settings.preset.clone()),
                ))?;
            }

            JobKind::Delete { source, target } => {
                fs::remove_file(target).map_err(JobError::io("remove", target))?;
                self.ledger
                    .append(&SyncRecord::tombstone(self.generation, source))?;
                prune_empty_ancestors(target, &self.root);
            }
        }

        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<(), JobError> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(JobError::io("create directory", parent)),
        None => Ok(()),
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("spec", &self.spec())
            .field("generation", &self.generation)
            .field("state", &self.state)
            .finish()
    }
}
