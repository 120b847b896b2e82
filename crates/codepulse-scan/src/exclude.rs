//! Exclude-pattern and well-known directory matching.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use codepulse_core::{ScanError, ScanFilters};

/// Directories that never contain analyzable sources worth scanning.
pub const WELL_KNOWN_SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    "build",
    "dist",
    "target",
    "bin",
    "obj",
    "coverage",
    ".coverage",
    ".next",
    ".nuxt",
    "vendor",
    "Pods",
];

/// Compiled exclude patterns for one scan.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
    skip_hidden_dirs: bool,
}

impl ExcludeMatcher {
    /// Compile the exclude patterns of `filters`.
    ///
    /// A pattern ending in `/**` also matches the directory itself, so
    /// `**/node_modules/**` prunes the `node_modules` directory before
    /// descending into it.
    pub fn new(filters: &ScanFilters) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &filters.exclude_patterns {
            let pattern = pattern.trim();
            add_glob(&mut builder, pattern)?;
            if let Some(dir_pattern) = pattern.strip_suffix("/**") {
                if !dir_pattern.is_empty() {
                    add_glob(&mut builder, dir_pattern)?;
                }
            }
        }
        let set = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self {
            set,
            skip_hidden_dirs: filters.skip_hidden_dirs,
        })
    }

    /// Whether a file (by `/`-separated relative path) is excluded.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        self.set.is_match(relative_path) || self.set.is_match(name)
    }

    /// Whether a directory should be pruned from a recursive scan.
    pub fn skips_dir(&self, name: &str, relative_path: &str) -> bool {
        if WELL_KNOWN_SKIP_DIRS.contains(&name) {
            return true;
        }
        if self.skip_hidden_dirs && name.starts_with('.') {
            return true;
        }
        self.is_excluded(relative_path)
    }
}

fn add_glob(builder: &mut GlobSetBuilder, pattern: &str) -> Result<(), ScanError> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    builder.add(glob);
    Ok(())
}
