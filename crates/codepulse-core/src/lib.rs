//! Core types and traits for codepulse.
//!
//! This crate provides the data model shared by the scanner, the analysis
//! engine and the watch scheduler: hashed file records, per-file and
//! per-function metrics, immutable directory snapshots, configuration and
//! the persisted snapshot format.

mod config;
mod error;
mod language;
mod metrics;
mod persist;
mod record;
mod snapshot;

pub use config::{
    AppConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_WATCHED_TARGETS,
    MAX_DEBOUNCE_MS, MIN_DEBOUNCE_MS, ScanFilters, ScanFiltersBuilder, WatchConfig,
};
pub use error::{AnalyzeError, ConfigError, PersistError, ScanError, ScanWarning, WarningKind};
pub use language::{BlockStyle, CommentSyntax, Language};
pub use metrics::{FileMetrics, FileTotals, FunctionMetrics};
pub use persist::{PersistedState, SnapshotStore, load_state, save_state};
pub use record::{ContentHash, FileRecord};
pub use snapshot::{
    ComplexityDistribution, DirectorySnapshot, ScanCounts, SizeDistribution, SnapshotMetadata,
    Summary,
};
