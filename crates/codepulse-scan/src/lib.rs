//! File system scanning for codepulse.
//!
//! `codepulse-scan` walks a target directory, applies the scan filters and
//! produces a sorted list of [`FileRecord`]s carrying BLAKE3 content hashes.
//! Only files that pass the filters are hashed.
//!
//! - **Shallow or recursive** traversal, recursive via jwalk
//! - **Directory pruning** of dependency and build caches and excluded paths
//! - **Parallel hashing** on the rayon pool
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use codepulse_scan::{DirectoryScanner, ScanFilters};
//!
//! let scanner = DirectoryScanner::new();
//! let outcome = scanner.scan("/path/to/project".as_ref(), &ScanFilters::deep()).unwrap();
//!
//! for record in &outcome.records {
//!     println!("{} {}", record.content_hash.short(), record.relative_path);
//! }
//! ```

mod exclude;
mod hash;
mod progress;
mod scanner;

pub use exclude::{ExcludeMatcher, WELL_KNOWN_SKIP_DIRS};
pub use hash::{hash_bytes, hash_file};
pub use progress::ScanProgress;
pub use scanner::{DirectoryScanner, ScanOutcome};

// Re-export core types for convenience
pub use codepulse_core::{
    ContentHash, FileRecord, Language, ScanCounts, ScanError, ScanFilters, ScanWarning,
    WarningKind,
};
