//! Scan filters and watch configuration.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default per-file size limit (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Smallest accepted debounce window.
pub const MIN_DEBOUNCE_MS: u64 = 100;

/// Largest accepted debounce window.
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Default cap on concurrently watched targets.
pub const DEFAULT_MAX_WATCHED_TARGETS: usize = 32;

const COMMON_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/out/**",
    "**/.git/**",
    "**/coverage/**",
    "**/*.min.js",
    "**/*.bundle.js",
];

const DEEP_EXCLUDES: &[&str] = &[
    "**/vendor/**",
    "**/third_party/**",
    "**/.vscode/**",
    "**/.idea/**",
    "**/target/**",
    "**/bin/**",
    "**/obj/**",
];

/// Filters applied while scanning a directory for analyzable files.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanFilters {
    /// Maximum depth to traverse (`None` or `0` = unlimited, `1` = immediate children).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Glob patterns excluding files and directories.
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are not analyzed.
    #[builder(default = "DEFAULT_MAX_FILE_SIZE")]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Skip directories whose name starts with `.`.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub skip_hidden_dirs: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl ScanFiltersBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(patterns) = &self.exclude_patterns {
            if let Some(empty) = patterns.iter().position(|p| p.trim().is_empty()) {
                return Err(format!("Exclude pattern #{empty} is empty"));
            }
        }
        if self.max_file_size == Some(0) {
            return Err("Maximum file size must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl ScanFilters {
    /// Create a new filters builder.
    pub fn builder() -> ScanFiltersBuilder {
        ScanFiltersBuilder::default()
    }

    /// Immediate children only, with the common exclude list.
    pub fn shallow() -> Self {
        Self {
            max_depth: Some(1),
            exclude_patterns: COMMON_EXCLUDES.iter().map(|p| p.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_hidden_dirs: true,
        }
    }

    /// Recursive traversal up to 50 levels with the extended exclude list.
    pub fn deep() -> Self {
        Self {
            max_depth: Some(50),
            exclude_patterns: COMMON_EXCLUDES
                .iter()
                .chain(DEEP_EXCLUDES)
                .map(|p| p.to_string())
                .collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_hidden_dirs: true,
        }
    }

    /// Effective depth limit, `None` meaning unbounded.
    pub fn depth_limit(&self) -> Option<u32> {
        self.max_depth.filter(|d| *d > 0)
    }

    /// Whether only immediate children are scanned.
    pub fn is_shallow(&self) -> bool {
        self.depth_limit() == Some(1)
    }
}

impl Default for ScanFilters {
    fn default() -> Self {
        Self::shallow()
    }
}

/// Settings for watch-driven re-analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Re-analyze automatically when the debounce window settles.
    pub auto_analysis: bool,
    /// Upper bound on concurrently watched targets.
    pub max_watched_targets: usize,
    /// Filters used for scheduled runs.
    pub filters: ScanFilters,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            auto_analysis: true,
            max_watched_targets: DEFAULT_MAX_WATCHED_TARGETS,
            filters: ScanFilters::default(),
        }
    }
}

impl WatchConfig {
    /// Debounce window clamped to the accepted range.
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
    }

    /// Set the debounce window, clamping it to the accepted range.
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        self
    }

    /// Enable or disable automatic analysis.
    pub fn with_auto_analysis(mut self, enabled: bool) -> Self {
        self.auto_analysis = enabled;
        self
    }

    /// Replace the scan filters.
    pub fn with_filters(mut self, filters: ScanFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Application configuration stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Watch and scheduling settings.
    pub watch: WatchConfig,
    /// Directory for persisted snapshots (defaults to the data dir).
    pub state_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codepulse")
            .join("config.toml")
    }

    /// Default directory for persisted snapshots.
    pub fn default_state_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codepulse")
            .join("snapshots")
    }

    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        config.watch.debounce_ms = config
            .watch
            .debounce_ms
            .clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Ok(config)
    }

    /// Resolved snapshot directory.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(Self::default_state_dir)
    }
}
