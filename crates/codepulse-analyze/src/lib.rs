//! Change detection and incremental analysis for codepulse.
//!
//! - **Change detection** - pure comparison of hashed file lists
//! - **File analysis** - the [`FileAnalyzer`] seam plus a built-in
//!   [`HeuristicAnalyzer`]
//! - **Incremental engine** - re-analyzes only what changed and merges the
//!   result with the previous snapshot
//!
//! ```rust,no_run
//! use codepulse_analyze::{HeuristicAnalyzer, IncrementalEngine};
//! use codepulse_core::ScanFilters;
//!
//! let engine = IncrementalEngine::new(HeuristicAnalyzer::new());
//! let first = engine.run("/path/to/project".as_ref(), &ScanFilters::deep(), None).unwrap();
//!
//! // Later: only changed files are analyzed again
//! let second = engine
//!     .run("/path/to/project".as_ref(), &ScanFilters::deep(), Some(&first.snapshot))
//!     .unwrap();
//! println!("{} files changed", second.changes.changed_count());
//! ```

mod analyzer;
mod changes;
mod engine;
mod heuristic;

pub use analyzer::{AnalyzerOutput, FileAnalyzer};
pub use changes::{
    ChangeKind, ChangeSet, FileChange, HashIndex, detect_changes, detect_changes_detailed,
    index_records,
};
pub use engine::{EngineConfig, IncrementalEngine, RunOutcome};
pub use heuristic::{HeuristicAnalyzer, analyze_source};

// Re-export core types
pub use codepulse_core::{AnalyzeError, ContentHash, DirectorySnapshot, FileMetrics, FunctionMetrics};
