//! Opaque transcoding capability

use crate::cancel::CancellationToken;
use crate::source::Track;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Settings handed to the transcoder for one conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSettings {
    /// Named preset, recorded as the artifact's transform
    pub preset: String,
    /// Output bit depth, `None` keeps the input's
    pub bits_per_sample: Option<u16>,
    /// Force float or integer output, `None` keeps the input's
    pub float_output: Option<bool>,
}

impl ConvertSettings {
    pub fn new(preset: impl Into<String>) -> Self {
        Self {
            preset: preset.into(),
            bits_per_sample: None,
            float_output: None,
        }
    }
}

/// Cooperative abort flag polled by a running transcoder
///
/// A flag linked to a run's [`CancellationToken`] also reads as raised once
/// the run is cancelled.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    raised: Arc<AtomicBool>,
    parent: Option<CancellationToken>,
}

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn linked(token: &CancellationToken) -> Self {
        Self {
            raised: Arc::default(),
            parent: Some(token.clone()),
        }
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("conversion aborted")]
    Aborted,

    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),
}

/// Converts one source track into an output file
///
/// Implementations must poll `abort` and return [`TranscodeError::Aborted`]
/// promptly once it is raised. Partial output should be removed on failure.
pub trait Transcoder: Send + Sync {
    fn transcode(
        &self,
        settings: &ConvertSettings,
        track: &Track,
        output: &Path,
        abort: &AbortFlag,
    ) -> Result<(), TranscodeError>;
}
