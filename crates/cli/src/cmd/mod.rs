//! CLI command implementations

pub mod config;
pub mod generations;
pub mod history;
pub mod status;
pub mod sync;
