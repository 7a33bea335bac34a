//! Decision engine: compare a source against its history and emit job specs
//!
//! Nothing here touches the filesystem beyond `stat` calls. Callers must
//! check that the source exists before calling [`decide`].

use crate::fsops::{newer, with_extension};
use crate::transcode::ConvertSettings;
use ledger::SyncRecord;
use std::fmt;
use std::path::{Path, PathBuf};

/// A filesystem action decided for one source, not yet bound to a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    /// Copy `from` verbatim to `to`; `from` is also the ledger key
    Copy { from: PathBuf, to: PathBuf },
    /// Relocate an existing artifact of `source` from `from` to `to`
    Move {
        source: PathBuf,
        from: PathBuf,
        to: PathBuf,
        /// Transform of the artifact being moved, carried into the new record
        transform: Option<String>,
    },
    /// Transcode `from` into `to`; `from` is also the ledger key
    Convert { from: PathBuf, to: PathBuf },
    /// Remove the artifact `target` that was produced for `source`
    Delete { source: PathBuf, target: PathBuf },
}

impl JobSpec {
    /// Path the job reads from. For Delete this is the ledger source.
    pub fn from(&self) -> &Path {
        match self {
            Self::Copy { from, .. } | Self::Move { from, .. } | Self::Convert { from, .. } => from,
            Self::Delete { source, .. } => source,
        }
    }

    /// Path the job writes. For Delete this is the path being removed.
    pub fn to(&self) -> &Path {
        match self {
            Self::Copy { to, .. } | Self::Move { to, .. } | Self::Convert { to, .. } => to,
            Self::Delete { target, .. } => target,
        }
    }

    /// Source path the job's ledger records are keyed by
    pub fn source(&self) -> &Path {
        match self {
            Self::Copy { from, .. } | Self::Convert { from, .. } => from,
            Self::Move { source, .. } | Self::Delete { source, .. } => source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
            Self::Convert { .. } => "convert",
            Self::Delete { .. } => "delete",
        }
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy { from, to } => write!(f, "Copy {} -> {}", from.display(), to.display()),
            Self::Move { from, to, .. } => {
                write!(f, "Move {} -> {}", from.display(), to.display())
            }
            Self::Convert { from, to } => {
                write!(f, "Convert {} -> {}", from.display(), to.display())
            }
            Self::Delete { target, .. } => write!(f, "Delete {}", target.display()),
        }
    }
}

/// Why a source produced no jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Destination exists and is newer than the source
    DestinationCurrent,
    /// Converted with the current preset and still newer than the source
    AlreadyConverted,
    /// Conversion requested but no transcoder is available
    ConversionUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::DestinationCurrent => "destination is up to date",
            Self::AlreadyConverted => "already converted with the current preset",
            Self::ConversionUnavailable => "conversion requested but no transcoder is available",
        };
        f.write_str(text)
    }
}

/// Jobs emitted for one source, in the order they must run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decision {
    pub jobs: Vec<JobSpec>,
    pub skip: Option<SkipReason>,
}

impl Decision {
    fn skip(reason: SkipReason) -> Self {
        Self {
            jobs: Vec::new(),
            skip: Some(reason),
        }
    }

    fn jobs(jobs: Vec<JobSpec>) -> Self {
        Self { jobs, skip: None }
    }
}

/// Decide what to do with `from`, whose computed destination is `to`
///
/// `old` is the ledger's latest record for `from`. When `convertible`, the
/// destination gets `convert_ext` and `settings` names the current preset.
/// A stale artifact is deleted before the new one is produced, and only if
/// its path differs from the new destination.
pub fn decide(
    from: &Path,
    to: &Path,
    old: Option<&SyncRecord>,
    convertible: bool,
    settings: Option<&ConvertSettings>,
    convert_ext: &str,
) -> Decision {
    let old_dest = old.and_then(SyncRecord::destination);

    if convertible {
        let to = with_extension(to, convert_ext);
        let Some(settings) = settings else {
            return Decision::skip(SkipReason::ConversionUnavailable);
        };
        let convert = JobSpec::Convert {
            from: from.to_path_buf(),
            to: to.clone(),
        };
        let stale_delete = old_dest
            .filter(|d| *d != to)
            .map(|d| JobSpec::Delete {
                source: from.to_path_buf(),
                target: d.to_path_buf(),
            });

        let Some(old) = old else {
            return Decision::jobs(vec![convert]);
        };

        if old.transform.as_deref() == Some(settings.preset.as_str()) {
            if newer(&to, from) {
                return Decision::skip(SkipReason::AlreadyConverted);
            }
            if let Some(d) = old_dest.filter(|d| *d != to && newer(d, from)) {
                return Decision::jobs(vec![JobSpec::Move {
                    source: from.to_path_buf(),
                    from: d.to_path_buf(),
                    to,
                    transform: old.transform.clone(),
                }]);
            }
        }

        // Either a different preset, a plain copy, or a stale conversion
        return Decision::jobs(stale_delete.into_iter().chain([convert]).collect());
    }

    if let (Some(old), Some(d)) = (old, old_dest) {
        if d != to && d.exists() {
            if old.transform.is_none() && newer(d, from) {
                return Decision::jobs(vec![JobSpec::Move {
                    source: from.to_path_buf(),
                    from: d.to_path_buf(),
                    to: to.to_path_buf(),
                    transform: None,
                }]);
            }
            return Decision::jobs(vec![
                JobSpec::Delete {
                    source: from.to_path_buf(),
                    target: d.to_path_buf(),
                },
                JobSpec::Copy {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                },
            ]);
        }
    }

    if newer(to, from) {
        return Decision::skip(SkipReason::DestinationCurrent);
    }

    Decision::jobs(vec![JobSpec::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    }])
}

/// Decide what to do with artwork `art` whose destination is `to`
///
/// `old` is the ledger's latest record keyed by the artwork path.
pub fn decide_cover(art: &Path, to: &Path, old: Option<&SyncRecord>) -> Option<JobSpec> {
    if newer(to, art) {
        return None;
    }

    if let Some(d) = old.and_then(SyncRecord::destination) {
        if d != to && newer(d, art) {
            return Some(JobSpec::Move {
                source: art.to_path_buf(),
                from: d.to_path_buf(),
                to: to.to_path_buf(),
                transform: None,
            });
        }
    }

    Some(JobSpec::Copy {
        from: art.to_path_buf(),
        to: to.to_path_buf(),
    })
}
