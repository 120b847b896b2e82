//! Per-file and per-function structural metrics.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::record::FileRecord;

/// Metrics for a single function, as reported by a file analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetrics {
    /// Function name (`unknown` when the analyzer could not name it).
    pub name: CompactString,
    /// Relative path of the file that owns this function.
    pub owner_relative_path: String,
    /// First line of the function (1-based).
    pub start_line: u32,
    /// Last line of the function (1-based, inclusive).
    pub end_line: u32,
    /// Length in lines.
    pub length: u32,
    /// Number of declared parameters.
    pub parameters: u32,
    /// Cyclomatic complexity.
    pub complexity: u32,
    /// Complexity per line of code.
    pub density: f64,
}

/// Line and class totals for a file, independent of its functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTotals {
    pub total_lines: u64,
    pub comment_lines: u64,
    pub class_count: u64,
}

/// Metrics for one file in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetrics {
    /// The scanned file this entry describes.
    #[serde(flatten)]
    pub record: FileRecord,
    pub total_lines: u64,
    pub comment_lines: u64,
    pub function_count: u64,
    pub class_count: u64,
    pub mean_complexity: f64,
    pub mean_density: f64,
    pub mean_parameters: f64,
    /// When the file was analyzed.
    pub analyzed_at: DateTime<Utc>,
    /// How long the analyzer took, in milliseconds.
    pub analysis_duration_ms: u64,
    /// Set when analysis failed and this entry is a zero-metric placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl FileMetrics {
    /// Build metrics for a successfully analyzed file.
    ///
    /// Per-file means are derived from `functions`; a file with no functions
    /// gets zero-valued means.
    pub fn new(
        record: FileRecord,
        totals: FileTotals,
        functions: &[FunctionMetrics],
        analyzed_at: DateTime<Utc>,
        analysis_duration_ms: u64,
    ) -> Self {
        Self {
            record,
            total_lines: totals.total_lines,
            comment_lines: totals.comment_lines,
            function_count: functions.len() as u64,
            class_count: totals.class_count,
            mean_complexity: mean(functions.iter().map(|f| f.complexity as f64)),
            mean_density: mean(functions.iter().map(|f| f.density)),
            mean_parameters: mean(functions.iter().map(|f| f.parameters as f64)),
            analyzed_at,
            analysis_duration_ms,
            analysis_error: None,
        }
    }

    /// Build a zero-metric placeholder for a file whose analysis failed.
    pub fn placeholder(
        record: FileRecord,
        error: impl Into<String>,
        analyzed_at: DateTime<Utc>,
        analysis_duration_ms: u64,
    ) -> Self {
        Self {
            record,
            total_lines: 0,
            comment_lines: 0,
            function_count: 0,
            class_count: 0,
            mean_complexity: 0.0,
            mean_density: 0.0,
            mean_parameters: 0.0,
            analyzed_at,
            analysis_duration_ms,
            analysis_error: Some(error.into()),
        }
    }

    /// Relative path identifying this file.
    pub fn relative_path(&self) -> &str {
        &self.record.relative_path
    }

    /// Whether this entry is a failed-analysis placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.analysis_error.is_some()
    }

    /// Compare everything except analysis timing.
    pub fn same_content(&self, other: &Self) -> bool {
        self.record == other.record
            && self.total_lines == other.total_lines
            && self.comment_lines == other.comment_lines
            && self.function_count == other.function_count
            && self.class_count == other.class_count
            && self.mean_complexity == other.mean_complexity
            && self.mean_density == other.mean_density
            && self.mean_parameters == other.mean_parameters
            && self.analysis_error == other.analysis_error
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
