//! Live analysis for codepulse.
//!
//! This crate keeps snapshots current while files change:
//!
//! - [`spawn_scheduler`] runs one debounced, single-flight state machine per
//!   watched target
//! - [`TargetWatcher`] feeds filesystem events into a scheduler
//! - [`SessionRegistry`] holds at most one presentation session per
//!   (target, kind)
//! - [`AnalysisContext`] ties them together and pushes every new snapshot to
//!   the sessions of its target
//!
//! # Example
//!
//! ```rust,no_run
//! use codepulse_analyze::{HeuristicAnalyzer, IncrementalEngine};
//! use codepulse_watch::{AnalysisContext, ConfigHandle};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), codepulse_watch::WatchError> {
//! let engine = IncrementalEngine::new(HeuristicAnalyzer::new());
//! let context = AnalysisContext::new(engine, ConfigHandle::default());
//!
//! let scheduler = context.watch(Path::new("."), None)?;
//! scheduler.analyze_now().await?;
//!
//! let mut updates = context.subscribe();
//! while let Ok(event) = updates.recv().await {
//!     println!("{} updated", event.target().display());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod error;
mod events;
mod registry;
mod scheduler;

pub use config::ConfigHandle;
pub use context::AnalysisContext;
pub use error::{SessionError, WatchError};
pub use events::TargetWatcher;
pub use registry::{
    AnalysisKind, PresentationHandle, RegistryEvent, SessionInfo, SessionRegistry,
};
pub use scheduler::{
    ChangeNotifier, SchedulerHandle, SchedulerStatus, SnapshotProducer, SnapshotUpdate,
    TargetEvent, spawn_scheduler,
};

// Re-export the types hosts need alongside the scheduler
pub use codepulse_analyze::{ChangeSet, IncrementalEngine, RunOutcome};
pub use codepulse_core::{DirectorySnapshot, WatchConfig};
