//! Error types for watching and session management.

use std::path::PathBuf;

use thiserror::Error;

use crate::registry::AnalysisKind;

/// Errors raised while setting up or driving watched targets.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem watcher could not be installed.
    #[error("Cannot watch {path}: {message}")]
    Setup { path: PathBuf, message: String },

    /// The target does not exist or is not watched.
    #[error("Not watched or not found: {path}")]
    NotFound { path: PathBuf },

    /// The target already has a scheduler.
    #[error("Already watching {path}")]
    AlreadyWatched { path: PathBuf },

    /// The watch set is full.
    #[error("Cannot watch more than {limit} targets")]
    TooManyTargets { limit: usize },

    /// The scheduler has shut down.
    #[error("Scheduler for {path} has shut down")]
    Closed { path: PathBuf },
}

/// Errors raised by the session registry.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already open for the key.
    #[error("A {kind} session is already open for {path}")]
    Conflict { path: PathBuf, kind: AnalysisKind },

    /// No session is open for the key.
    #[error("No {kind} session open for {path}")]
    NotFound { path: PathBuf, kind: AnalysisKind },
}
