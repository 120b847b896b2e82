//! On-disk snapshot documents.
//!
//! A persisted document seeds the previous snapshot on the next startup.
//! Two shapes exist: the full snapshot, and a flattened file list used by
//! lighter presentation modes. Both are written as one tagged document so the
//! shape never has to be guessed on load.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::ScanFilters;
use crate::error::PersistError;
use crate::metrics::FileMetrics;
use crate::snapshot::{DirectorySnapshot, ScanCounts, SnapshotMetadata, Summary};

/// A persisted analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum PersistedState {
    /// Complete snapshot including functions and summary.
    Full(DirectorySnapshot),
    /// File metrics only.
    Flat(Vec<FileMetrics>),
}

impl PersistedState {
    /// Wrap a snapshot in the requested shape.
    pub fn from_snapshot(snapshot: &DirectorySnapshot, flat: bool) -> Self {
        if flat {
            Self::Flat(snapshot.files.clone())
        } else {
            Self::Full(snapshot.clone())
        }
    }

    /// Convert into a snapshot usable as the previous run.
    ///
    /// A flat document carries no functions and no scan counts, so the
    /// resulting snapshot has an empty function list and a summary computed
    /// from the files alone.
    pub fn into_snapshot(self, directory_path: &Path) -> DirectorySnapshot {
        match self {
            Self::Full(snapshot) => snapshot,
            Self::Flat(mut files) => {
                files.sort_by(|a, b| a.relative_path().cmp(b.relative_path()));
                files.dedup_by(|a, b| a.relative_path() == b.relative_path());
                let counts = ScanCounts {
                    total_files: files.len() as u64,
                    analyzable_files: files.len() as u64,
                    non_analyzable_files: 0,
                };
                let summary = Summary::compute(directory_path, &files, counts);
                DirectorySnapshot {
                    directory_path: directory_path.to_path_buf(),
                    metadata: SnapshotMetadata {
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        is_incremental: false,
                        files_analyzed_this_session: 0,
                        total_files_considered: files.len() as u64,
                        filters: ScanFilters::default(),
                        timestamp: Utc::now(),
                        duration_ms: 0,
                    },
                    files,
                    functions: Vec::new(),
                    summary,
                }
            }
        }
    }

    /// Number of files in the document.
    pub fn file_count(&self) -> usize {
        match self {
            Self::Full(snapshot) => snapshot.files.len(),
            Self::Flat(files) => files.len(),
        }
    }
}

/// Directory of persisted snapshot documents, one per target.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Document path for a target.
    pub fn path_for(&self, target: &Path) -> PathBuf {
        let mut name: String = target
            .to_string_lossy()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        name = name.trim_matches('_').to_string();
        if name.is_empty() {
            name.push_str("root");
        }
        self.dir.join(format!("{name}.json"))
    }

    /// Load the document for a target, if any.
    pub fn load(&self, target: &Path) -> Result<Option<PersistedState>, PersistError> {
        load_state(&self.path_for(target))
    }

    /// Save the document for a target.
    pub fn save(&self, target: &Path, state: &PersistedState) -> Result<PathBuf, PersistError> {
        let path = self.path_for(target);
        save_state(&path, state)?;
        Ok(path)
    }
}

/// Load a persisted document; a missing file is `Ok(None)`.
pub fn load_state(path: &Path) -> Result<Option<PersistedState>, PersistError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(PersistError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a persisted document atomically (temp file in the same directory, then rename).
pub fn save_state(path: &Path, state: &PersistedState) -> Result<(), PersistError> {
    let io_err = |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let json = serde_json::to_vec_pretty(state).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    tracing::debug!(path = %path.display(), files = state.file_count(), "saved snapshot");
    Ok(())
}
