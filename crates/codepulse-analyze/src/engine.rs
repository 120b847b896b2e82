//! Incremental analysis engine.
//!
//! One run scans the target, compares hashes against the previous snapshot,
//! re-analyzes only added and modified files, carries unchanged results over
//! and recomputes the summary from the complete merged file list.

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use codepulse_core::{
    DirectorySnapshot, FileMetrics, FileRecord, FunctionMetrics, ScanError, ScanFilters,
    ScanWarning, SnapshotMetadata, Summary,
};
use codepulse_scan::DirectoryScanner;

use crate::analyzer::FileAnalyzer;
use crate::changes::{ChangeKind, ChangeSet, HashIndex, detect_changes, index_records};

/// Engine settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Analyze changed files on the rayon pool instead of sequentially.
    pub parallel: bool,
}

impl EngineConfig {
    pub fn parallel() -> Self {
        Self { parallel: true }
    }
}

/// Result of one successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub snapshot: DirectorySnapshot,
    pub changes: ChangeSet,
    /// Non-fatal scan problems.
    pub warnings: Vec<ScanWarning>,
}

/// Drives scanner, change detector and analyzer for one target at a time.
pub struct IncrementalEngine<A> {
    scanner: DirectoryScanner,
    analyzer: A,
    config: EngineConfig,
}

impl<A: FileAnalyzer> IncrementalEngine<A> {
    /// Create an engine around an analyzer.
    pub fn new(analyzer: A) -> Self {
        Self {
            scanner: DirectoryScanner::new(),
            analyzer,
            config: EngineConfig::default(),
        }
    }

    /// Replace the engine settings.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the scanner, e.g. one restricted to some languages.
    pub fn with_scanner(mut self, scanner: DirectoryScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// The scanner, for progress subscriptions.
    pub fn scanner(&self) -> &DirectoryScanner {
        &self.scanner
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Produce a new snapshot of `target`.
    ///
    /// A scan failure aborts the run and returns the error; nothing derived
    /// from `previous` is modified. Per-file analysis failures are recorded
    /// as zero-metric placeholders and retried on the next run.
    pub fn run(
        &self,
        target: &Path,
        filters: &ScanFilters,
        previous: Option<&DirectorySnapshot>,
    ) -> Result<RunOutcome, ScanError> {
        let start = Instant::now();
        let scan = self.scanner.scan(target, filters)?;

        let previous = previous.filter(|p| {
            let same_root = p.directory_path == scan.root;
            if !same_root {
                warn!(
                    previous = %p.directory_path.display(),
                    current = %scan.root.display(),
                    "previous snapshot describes another directory, running full analysis"
                );
            }
            same_root
        });

        let previous_hashes: HashIndex = previous.map(DirectorySnapshot::hashes).unwrap_or_default();
        let changes = detect_changes(&index_records(&scan.records), &previous_hashes);

        let mut to_analyze: Vec<&FileRecord> = Vec::new();
        let mut carried: Vec<FileMetrics> = Vec::new();
        for record in &scan.records {
            let kept = match (changes.kind_of(&record.relative_path), previous) {
                (Some(ChangeKind::Unchanged), Some(prev)) => prev
                    .file(&record.relative_path)
                    .filter(|f| !f.is_placeholder()),
                _ => None,
            };
            match kept {
                Some(file) => carried.push(FileMetrics {
                    record: record.clone(),
                    ..file.clone()
                }),
                None => to_analyze.push(record),
            }
        }

        debug!(
            root = %scan.root.display(),
            to_analyze = to_analyze.len(),
            carried = carried.len(),
            "planned run"
        );

        let analyzed: Vec<(FileMetrics, Vec<FunctionMetrics>)> = if self.config.parallel {
            to_analyze.par_iter().map(|r| self.analyze_one(r)).collect()
        } else {
            to_analyze.iter().map(|r| self.analyze_one(r)).collect()
        };
        let files_analyzed = analyzed.len() as u64;

        // Merge: the only point where analyzed and carried results meet.
        let carried_paths: HashSet<&str> = carried.iter().map(|f| f.relative_path()).collect();
        let mut functions: Vec<FunctionMetrics> = previous
            .map(|p| {
                p.functions
                    .iter()
                    .filter(|f| carried_paths.contains(f.owner_relative_path.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut files = carried;
        for (file, file_functions) in analyzed {
            files.push(file);
            functions.extend(file_functions);
        }
        files.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
        functions.sort_by(|a, b| {
            a.owner_relative_path
                .cmp(&b.owner_relative_path)
                .then(a.start_line.cmp(&b.start_line))
        });

        let summary = Summary::compute(&scan.root, &files, scan.counts);
        let metadata = SnapshotMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            is_incremental: previous.is_some(),
            files_analyzed_this_session: files_analyzed,
            total_files_considered: files.len() as u64,
            filters: filters.clone(),
            timestamp: Utc::now(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            root = %scan.root.display(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            deleted = changes.deleted.len(),
            unchanged = changes.unchanged.len(),
            analyzed = files_analyzed,
            duration_ms = metadata.duration_ms,
            "analysis run complete"
        );

        Ok(RunOutcome {
            snapshot: DirectorySnapshot {
                directory_path: scan.root,
                files,
                functions,
                summary,
                metadata,
            },
            changes,
            warnings: scan.warnings,
        })
    }

    /// Analyze one file, turning failure into a placeholder.
    fn analyze_one(&self, record: &FileRecord) -> (FileMetrics, Vec<FunctionMetrics>) {
        let start = Instant::now();
        match self.analyzer.analyze(&record.absolute_path, record.language) {
            Ok(output) => {
                let functions: Vec<FunctionMetrics> = output
                    .functions
                    .into_iter()
                    .map(|f| FunctionMetrics {
                        owner_relative_path: record.relative_path.clone(),
                        ..f
                    })
                    .collect();
                let metrics = FileMetrics::new(
                    record.clone(),
                    output.totals,
                    &functions,
                    Utc::now(),
                    start.elapsed().as_millis() as u64,
                );
                (metrics, functions)
            }
            Err(e) => {
                warn!(
                    file = %record.relative_path,
                    analyzer = self.analyzer.name(),
                    error = %e,
                    "file analysis failed, recording placeholder"
                );
                let metrics = FileMetrics::placeholder(
                    record.clone(),
                    e.to_string(),
                    Utc::now(),
                    start.elapsed().as_millis() as u64,
                );
                (metrics, Vec::new())
            }
        }
    }
}
