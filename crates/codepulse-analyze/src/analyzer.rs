//! The per-file analyzer seam.

use std::path::Path;
use std::sync::Arc;

use codepulse_core::{AnalyzeError, FileTotals, FunctionMetrics, Language};

/// Structural metrics for one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzerOutput {
    pub totals: FileTotals,
    /// Functions found in the file. `owner_relative_path` is filled in by
    /// the engine.
    pub functions: Vec<FunctionMetrics>,
}

/// Turns a file's text into line, class and function metrics.
///
/// Implementations are shared across worker threads.
pub trait FileAnalyzer: Send + Sync {
    /// Analyze one file.
    fn analyze(&self, path: &Path, language: Language) -> Result<AnalyzerOutput, AnalyzeError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "analyzer"
    }
}

impl<A: FileAnalyzer + ?Sized> FileAnalyzer for Arc<A> {
    fn analyze(&self, path: &Path, language: Language) -> Result<AnalyzerOutput, AnalyzeError> {
        (**self).analyze(path, language)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<A: FileAnalyzer + ?Sized> FileAnalyzer for Box<A> {
    fn analyze(&self, path: &Path, language: Language) -> Result<AnalyzerOutput, AnalyzeError> {
        (**self).analyze(path, language)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
