//! Filesystem-backed implementations of the engine's host boundary

pub mod artwork;
pub mod library;
pub mod transcoder;

pub use artwork::FolderArtwork;
pub use library::DirectoryLibrary;
pub use transcoder::CommandTranscoder;
