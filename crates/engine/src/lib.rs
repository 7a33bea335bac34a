//! Synchronization decision engine for one-way media mirroring
//!
//! This crate provides:
//! - Decision engine (copy / move / convert / delete per source)
//! - Jobs that perform one action and record it in the ledger
//! - Cancellable job queue and worker pool
//! - Bounded-time artwork lookup
//! - Run orchestration with progress callbacks and dry runs

pub mod cancel;
pub mod config;
pub mod cover;
pub mod decision;
pub mod error;
pub mod fsops;
pub mod job;
pub mod mirror;
mod pool;
pub mod queue;
pub mod source;
pub mod transcode;

// Re-exports
pub use cancel::CancellationToken;
pub use config::{ConversionConfig, CoverConfig, SyncConfig};
pub use cover::{ArtworkProvider, ArtworkReply, CoverOutcome, CoverRequest, CoverResolver};
pub use decision::{decide, decide_cover, Decision, JobSpec, SkipReason};
pub use error::{Result, SyncError};
pub use fsops::newer;
pub use job::{Job, JobEnv, JobError, JobOutcome, JobState};
pub use mirror::{Callbacks, Mirror, QueuePhase, QueueReport, RunContext, RunReport, RunStatus};
pub use pool::ExecutionReport;
pub use queue::{Abortable, JobQueue};
pub use source::{Library, Track};
pub use transcode::{AbortFlag, ConvertSettings, TranscodeError, Transcoder};
