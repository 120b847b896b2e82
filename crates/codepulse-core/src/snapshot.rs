//! Directory snapshots and their summary statistics.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScanFilters;
use crate::metrics::{FileMetrics, FunctionMetrics};
use crate::record::ContentHash;

/// File counts reported by the scanner for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    /// Every file the scanner looked at.
    pub total_files: u64,
    /// Files that passed the language, size and exclude filters.
    pub analyzable_files: u64,
    /// Files rejected by the filters or unreadable.
    pub non_analyzable_files: u64,
}

/// File counts by size bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeDistribution {
    /// Under 1 KiB.
    pub small: u64,
    /// 1 KiB up to 10 KiB.
    pub medium: u64,
    /// 10 KiB up to 100 KiB.
    pub large: u64,
    /// 100 KiB and above.
    pub huge: u64,
}

impl SizeDistribution {
    fn record(&mut self, size: u64) {
        match size {
            0..1024 => self.small += 1,
            1024..10_240 => self.medium += 1,
            10_240..102_400 => self.large += 1,
            _ => self.huge += 1,
        }
    }
}

/// File counts by mean complexity bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityDistribution {
    /// Mean complexity up to 5.
    pub low: u64,
    /// Above 5, up to 10.
    pub medium: u64,
    /// Above 10, up to 20.
    pub high: u64,
    /// Above 20.
    pub critical: u64,
}

impl ComplexityDistribution {
    fn record(&mut self, complexity: f64) {
        if complexity <= 5.0 {
            self.low += 1;
        } else if complexity <= 10.0 {
            self.medium += 1;
        } else if complexity <= 20.0 {
            self.high += 1;
        } else {
            self.critical += 1;
        }
    }
}

/// Aggregate statistics over every file in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Directory the snapshot describes.
    pub directory_path: PathBuf,
    /// Files in the snapshot.
    pub total_files: u64,
    /// Files in the snapshot with real (non-placeholder) metrics.
    pub total_files_analyzed: u64,
    /// Non-analyzable files seen by the scan plus failed placeholders.
    pub total_files_not_analyzed: u64,
    /// Every file the scanner looked at, analyzable or not.
    pub files_seen: u64,
    pub total_lines: u64,
    pub total_comment_lines: u64,
    pub total_functions: u64,
    pub total_classes: u64,
    /// Mean of per-file mean complexity.
    pub average_complexity: f64,
    /// Mean of per-file mean density.
    pub average_density: f64,
    /// Mean of per-file mean parameter count.
    pub average_parameters: f64,
    /// File counts keyed by language display name.
    pub language_distribution: BTreeMap<String, u64>,
    pub size_distribution: SizeDistribution,
    pub complexity_distribution: ComplexityDistribution,
}

impl Summary {
    /// Compute a summary from the complete file list of a snapshot.
    pub fn compute(directory_path: impl Into<PathBuf>, files: &[FileMetrics], counts: ScanCounts) -> Self {
        let placeholders = files.iter().filter(|f| f.is_placeholder()).count() as u64;
        let n = files.len() as f64;
        let average = |value: fn(&FileMetrics) -> f64| {
            if files.is_empty() {
                0.0
            } else {
                files.iter().map(value).sum::<f64>() / n
            }
        };

        let mut language_distribution = BTreeMap::new();
        let mut size_distribution = SizeDistribution::default();
        let mut complexity_distribution = ComplexityDistribution::default();
        for file in files {
            *language_distribution
                .entry(file.record.language.to_string())
                .or_insert(0) += 1;
            size_distribution.record(file.record.size_bytes);
            complexity_distribution.record(file.mean_complexity);
        }

        Self {
            directory_path: directory_path.into(),
            total_files: files.len() as u64,
            total_files_analyzed: files.len() as u64 - placeholders,
            total_files_not_analyzed: counts.non_analyzable_files + placeholders,
            files_seen: counts.total_files,
            total_lines: files.iter().map(|f| f.total_lines).sum(),
            total_comment_lines: files.iter().map(|f| f.comment_lines).sum(),
            total_functions: files.iter().map(|f| f.function_count).sum(),
            total_classes: files.iter().map(|f| f.class_count).sum(),
            average_complexity: average(|f| f.mean_complexity),
            average_density: average(|f| f.mean_density),
            average_parameters: average(|f| f.mean_parameters),
            language_distribution,
            size_distribution,
            complexity_distribution,
        }
    }
}

/// Bookkeeping about the run that produced a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Tool version that wrote the snapshot.
    pub version: String,
    /// Whether a previous snapshot was reused.
    pub is_incremental: bool,
    /// Files passed to the analyzer during this run.
    pub files_analyzed_this_session: u64,
    /// Size of the merged file list.
    pub total_files_considered: u64,
    /// Filters the run used.
    pub filters: ScanFilters,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Wall time of the whole run, in milliseconds.
    pub duration_ms: u64,
}

/// Immutable result of one complete analysis run over a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Directory the snapshot describes.
    pub directory_path: PathBuf,
    /// One entry per file, sorted by relative path.
    pub files: Vec<FileMetrics>,
    /// Functions of every file in `files`.
    pub functions: Vec<FunctionMetrics>,
    /// Aggregates recomputed from `files`.
    pub summary: Summary,
    /// Run bookkeeping.
    pub metadata: SnapshotMetadata,
}

impl DirectorySnapshot {
    /// Look up a file by relative path.
    pub fn file(&self, relative_path: &str) -> Option<&FileMetrics> {
        self.files
            .binary_search_by(|f| f.relative_path().cmp(relative_path))
            .ok()
            .map(|i| &self.files[i])
    }

    /// Functions belonging to a file.
    pub fn functions_of<'a>(
        &'a self,
        relative_path: &'a str,
    ) -> impl Iterator<Item = &'a FunctionMetrics> + 'a {
        self.functions
            .iter()
            .filter(move |f| f.owner_relative_path == relative_path)
    }

    /// Map of relative path to content hash.
    pub fn hashes(&self) -> BTreeMap<String, ContentHash> {
        self.files
            .iter()
            .map(|f| (f.record.relative_path.clone(), f.record.content_hash))
            .collect()
    }

    /// Number of files in the snapshot.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}
