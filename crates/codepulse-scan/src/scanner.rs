//! Directory scanner producing hashed candidate files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jwalk::WalkDir;
use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::debug;

use codepulse_core::{
    FileRecord, Language, ScanCounts, ScanError, ScanFilters, ScanWarning, WarningKind,
};

use crate::exclude::ExcludeMatcher;
use crate::hash::hash_file;
use crate::progress::{ProgressTracker, ScanProgress};

/// Result of one scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Canonical directory the relative paths are relative to.
    pub root: PathBuf,
    /// Hashed candidates, sorted by relative path.
    pub records: Vec<FileRecord>,
    /// File counts for the summary.
    pub counts: ScanCounts,
    /// Non-fatal problems encountered.
    pub warnings: Vec<ScanWarning>,
    /// Wall time of the scan.
    pub duration: Duration,
}

impl ScanOutcome {
    /// Scan duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// A file that passed the filters and still needs hashing.
struct Candidate {
    absolute_path: PathBuf,
    relative_path: String,
    language: Language,
    size_bytes: u64,
}

/// Scanner that finds analyzable files and hashes them.
pub struct DirectoryScanner {
    progress_tx: broadcast::Sender<ScanProgress>,
    languages: Option<Arc<[Language]>>,
}

impl DirectoryScanner {
    /// Create a new scanner accepting every supported language.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            progress_tx,
            languages: None,
        }
    }

    /// Restrict candidates to the given languages.
    pub fn with_languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        self.languages = Some(languages.into_iter().collect());
        self
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan a target.
    ///
    /// A directory is scanned according to `filters`; a single file yields a
    /// one-file scan rooted at its parent directory.
    pub fn scan(&self, target: &Path, filters: &ScanFilters) -> Result<ScanOutcome, ScanError> {
        let target = target.canonicalize().map_err(|e| ScanError::io(target, e))?;
        let metadata = std::fs::metadata(&target).map_err(|e| ScanError::io(&target, e))?;
        if metadata.is_file() {
            return self.scan_file(&target, filters);
        }
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: target });
        }

        let start = Instant::now();
        let matcher = ExcludeMatcher::new(filters)?;

        // An unreadable root aborts the run; anything below it only warns.
        std::fs::read_dir(&target).map_err(|e| ScanError::io(&target, e))?;

        let mut counts = ScanCounts::default();
        let mut warnings = Vec::new();
        let candidates = if filters.is_shallow() {
            self.collect_shallow(&target, filters, &matcher, &mut counts, &mut warnings)?
        } else {
            self.collect_recursive(&target, filters, &matcher, &mut counts, &mut warnings)
        };

        let records = self.hash_candidates(candidates, &mut counts, &mut warnings);
        let duration = start.elapsed();

        debug!(
            root = %target.display(),
            files = counts.total_files,
            analyzable = counts.analyzable_files,
            warnings = warnings.len(),
            ?duration,
            "scan complete"
        );

        Ok(ScanOutcome {
            root: target,
            records,
            counts,
            warnings,
            duration,
        })
    }

    /// Scan a single file.
    pub fn scan_file(&self, file: &Path, filters: &ScanFilters) -> Result<ScanOutcome, ScanError> {
        let start = Instant::now();
        let file = file.canonicalize().map_err(|e| ScanError::io(file, e))?;
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ScanError::Other {
                message: format!("{} has no parent directory", file.display()),
            })?;
        let metadata = std::fs::metadata(&file).map_err(|e| ScanError::io(&file, e))?;
        let matcher = ExcludeMatcher::new(filters)?;
        let relative_path = relative_path(&root, &file);

        let mut counts = ScanCounts {
            total_files: 1,
            ..ScanCounts::default()
        };
        let mut warnings = Vec::new();
        let candidates: Vec<Candidate> = self
            .candidate(file, relative_path, metadata.len(), filters, &matcher)
            .into_iter()
            .collect();
        let mut tracker = ProgressTracker::exact(&self.progress_tx, 1);
        tracker.record_file(candidates.first().map_or("", |c| c.relative_path.as_str()));

        let records = self.hash_candidates(candidates, &mut counts, &mut warnings);

        Ok(ScanOutcome {
            root,
            records,
            counts,
            warnings,
            duration: start.elapsed(),
        })
    }

    /// Enumerate immediate children only.
    fn collect_shallow(
        &self,
        root: &Path,
        filters: &ScanFilters,
        matcher: &ExcludeMatcher,
        counts: &mut ScanCounts,
        warnings: &mut Vec<ScanWarning>,
    ) -> Result<Vec<Candidate>, ScanError> {
        let entries: Vec<_> = std::fs::read_dir(root)
            .map_err(|e| ScanError::io(root, e))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warnings.push(ScanWarning::from_io(root, &err));
                    None
                }
            })
            .collect();

        let files: Vec<_> = entries
            .into_iter()
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(true))
            .collect();

        let mut tracker = ProgressTracker::exact(&self.progress_tx, files.len() as u64);
        let mut candidates = Vec::new();
        for entry in files {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            counts.total_files += 1;
            tracker.record_file(&name);

            match entry.metadata() {
                Ok(metadata) => {
                    candidates.extend(self.candidate(path, name, metadata.len(), filters, matcher));
                }
                Err(err) => warnings.push(ScanWarning::from_io(&path, &err)),
            }
        }
        Ok(candidates)
    }

    /// Depth-bounded traversal with directory pruning.
    fn collect_recursive(
        &self,
        root: &Path,
        filters: &ScanFilters,
        matcher: &ExcludeMatcher,
        counts: &mut ScanCounts,
        warnings: &mut Vec<ScanWarning>,
    ) -> Vec<Candidate> {
        let prune_matcher = matcher.clone();
        let prune_root: Arc<Path> = Arc::from(root);

        let walker = WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .max_depth(
                filters
                    .depth_limit()
                    .map(|d| d as usize)
                    .unwrap_or(usize::MAX),
            )
            .process_read_dir(move |_depth, _parent, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) if entry.depth > 0 && entry.file_type.is_dir() => {
                        let name = entry.file_name.to_string_lossy();
                        let rel = relative_path(&prune_root, &entry.path());
                        !prune_matcher.skips_dir(&name, &rel)
                    }
                    _ => true,
                });
            });

        let mut tracker = ProgressTracker::estimating(&self.progress_tx);
        let mut candidates = Vec::new();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warnings.push(ScanWarning::new(
                        path,
                        err.to_string(),
                        WarningKind::ReadError,
                    ));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel = relative_path(root, &path);
            counts.total_files += 1;
            tracker.record_file(&rel);

            match entry.metadata() {
                Ok(metadata) => {
                    candidates.extend(self.candidate(path, rel, metadata.len(), filters, matcher));
                }
                Err(err) => warnings.push(ScanWarning::new(
                    &path,
                    err.to_string(),
                    WarningKind::MetadataError,
                )),
            }
        }
        tracker.finish();
        candidates
    }

    /// Apply the language, exclude and size filters.
    fn candidate(
        &self,
        absolute_path: PathBuf,
        relative_path: String,
        size_bytes: u64,
        filters: &ScanFilters,
        matcher: &ExcludeMatcher,
    ) -> Option<Candidate> {
        let language = Language::from_path(&absolute_path)?;
        if let Some(allowed) = &self.languages {
            if !allowed.contains(&language) {
                return None;
            }
        }
        if size_bytes > filters.max_file_size || matcher.is_excluded(&relative_path) {
            return None;
        }
        Some(Candidate {
            absolute_path,
            relative_path,
            language,
            size_bytes,
        })
    }

    /// Hash candidates in parallel; unreadable files become warnings.
    fn hash_candidates(
        &self,
        candidates: Vec<Candidate>,
        counts: &mut ScanCounts,
        warnings: &mut Vec<ScanWarning>,
    ) -> Vec<FileRecord> {
        let hashed: Vec<Result<FileRecord, ScanWarning>> = candidates
            .into_par_iter()
            .map(|c| match hash_file(&c.absolute_path) {
                Ok(content_hash) => Ok(FileRecord {
                    relative_path: c.relative_path,
                    absolute_path: c.absolute_path,
                    language: c.language,
                    size_bytes: c.size_bytes,
                    content_hash,
                }),
                Err(err) => Err(ScanWarning::from_io(&c.absolute_path, &err)),
            })
            .collect();

        let mut records = Vec::with_capacity(hashed.len());
        for result in hashed {
            match result {
                Ok(record) => records.push(record),
                Err(warning) => warnings.push(warning),
            }
        }
        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        counts.analyzable_files = records.len() as u64;
        counts.non_analyzable_files = counts.total_files.saturating_sub(counts.analyzable_files);
        records
    }
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();

        fs::write(root.join("main.py"), "def main():\n    pass\n").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();
        fs::write(root.join("src/lib.rs"), "fn lib() {}\n").unwrap();
        fs::write(root.join("src/nested/deep.go"), "func deep() {}\n").unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "module.exports = 1;\n").unwrap();
        fs::write(root.join(".cache/tmp.py"), "x = 1\n").unwrap();

        temp
    }

    fn paths(outcome: &ScanOutcome) -> Vec<&str> {
        outcome.records.iter().map(|r| r.relative_path.as_str()).collect()
    }

    #[test]
    fn test_shallow_scan() {
        let temp = create_test_tree();
        let outcome = DirectoryScanner::new()
            .scan(temp.path(), &ScanFilters::shallow())
            .unwrap();

        assert_eq!(paths(&outcome), vec!["main.py"]);
        assert_eq!(outcome.counts.total_files, 2);
        assert_eq!(outcome.counts.analyzable_files, 1);
        assert_eq!(outcome.counts.non_analyzable_files, 1);
    }

    #[test]
    fn test_recursive_scan_skips_well_known_dirs() {
        let temp = create_test_tree();
        let filters = ScanFilters::builder().max_depth(None::<u32>).build().unwrap();
        let outcome = DirectoryScanner::new().scan(temp.path(), &filters).unwrap();

        assert_eq!(
            paths(&outcome),
            vec!["main.py", "src/lib.rs", "src/nested/deep.go"]
        );
        assert_eq!(outcome.counts.total_files, 4);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let temp = create_test_tree();
        let filters = ScanFilters::builder().max_depth(Some(2u32)).build().unwrap();
        let outcome = DirectoryScanner::new().scan(temp.path(), &filters).unwrap();

        assert_eq!(paths(&outcome), vec!["main.py", "src/lib.rs"]);
    }

    #[test]
    fn test_exclude_and_size_filters() {
        let temp = create_test_tree();
        fs::write(temp.path().join("src/big.rs"), vec![b'a'; 4096]).unwrap();
        let filters = ScanFilters::builder()
            .max_depth(Some(0u32))
            .exclude_patterns(vec!["**/nested/**".to_string()])
            .max_file_size(1024u64)
            .build()
            .unwrap();
        let outcome = DirectoryScanner::new().scan(temp.path(), &filters).unwrap();

        assert_eq!(paths(&outcome), vec!["main.py", "src/lib.rs"]);
    }

    #[test]
    fn test_language_restriction() {
        let temp = create_test_tree();
        let filters = ScanFilters::builder().max_depth(None::<u32>).build().unwrap();
        let outcome = DirectoryScanner::new()
            .with_languages([Language::Rust])
            .scan(temp.path(), &filters)
            .unwrap();

        assert_eq!(paths(&outcome), vec!["src/lib.rs"]);
    }

    #[test]
    fn test_single_file_target() {
        let temp = create_test_tree();
        let outcome = DirectoryScanner::new()
            .scan(&temp.path().join("src/lib.rs"), &ScanFilters::deep())
            .unwrap();

        assert_eq!(paths(&outcome), vec!["lib.rs"]);
        assert_eq!(outcome.root, temp.path().join("src").canonicalize().unwrap());
        assert_eq!(outcome.counts.total_files, 1);
    }

    #[test]
    fn test_hashes_track_content() {
        let temp = create_test_tree();
        let scanner = DirectoryScanner::new();
        let before = scanner.scan(temp.path(), &ScanFilters::shallow()).unwrap();
        fs::write(temp.path().join("main.py"), "def main():\n    return 1\n").unwrap();
        let after = scanner.scan(temp.path(), &ScanFilters::shallow()).unwrap();

        assert_ne!(before.records[0].content_hash, after.records[0].content_hash);
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp = TempDir::new().unwrap();
        let err = DirectoryScanner::new()
            .scan(&temp.path().join("gone"), &ScanFilters::shallow())
            .unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_progress_is_broadcast() {
        let temp = create_test_tree();
        let scanner = DirectoryScanner::new();
        let mut rx = scanner.subscribe();
        scanner.scan(temp.path(), &ScanFilters::shallow()).unwrap();

        let update = rx.try_recv().unwrap();
        assert_eq!(update.total, 2);
        assert!(!update.total_is_estimate);
    }
}
