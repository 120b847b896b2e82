use codepulse_analyze::{
    AnalyzeError, AnalyzerOutput, ChangeKind, EngineConfig, FileAnalyzer, FunctionMetrics,
    HeuristicAnalyzer, IncrementalEngine, detect_changes, detect_changes_detailed,
    index_records,
};
use codepulse_core::{FileTotals, Language, PersistedState, ScanFilters, load_state, save_state};
use codepulse_scan::DirectoryScanner;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Deterministic analyzer: one function per line starting with `def`, with
/// complexity equal to the number of `if` tokens plus one. Files containing
/// `FAIL` fail.
#[derive(Default)]
struct FakeAnalyzer {
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeAnalyzer {
    fn calls(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl FileAnalyzer for FakeAnalyzer {
    fn analyze(&self, path: &Path, _language: Language) -> Result<AnalyzerOutput, AnalyzeError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        let text = fs::read_to_string(path).map_err(|source| AnalyzeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if text.contains("FAIL") {
            return Err(AnalyzeError::Failed {
                path: path.to_path_buf(),
                message: "refused".to_string(),
            });
        }

        let lines: Vec<&str> = text.lines().collect();
        let functions = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("def"))
            .map(|(i, l)| {
                let complexity = 1 + l.matches(" if").count() as u32;
                FunctionMetrics {
                    name: l.trim_start_matches("def ").into(),
                    owner_relative_path: String::new(),
                    start_line: i as u32 + 1,
                    end_line: i as u32 + 1,
                    length: 1,
                    parameters: 0,
                    complexity,
                    density: complexity as f64,
                }
            })
            .collect();

        Ok(AnalyzerOutput {
            totals: FileTotals {
                total_lines: lines.len() as u64,
                comment_lines: lines.iter().filter(|l| l.starts_with('#')).count() as u64,
                class_count: 0,
            },
            functions,
        })
    }
}

fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.py"), "def alpha\n# note\n").unwrap();
    fs::write(temp.path().join("b.py"), "def beta if if\ndef gamma\n").unwrap();
    temp
}

fn deep() -> ScanFilters {
    ScanFilters::deep()
}

#[test]
fn test_scenario_modify_then_delete() {
    let temp = project();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());

    // Run 1: no previous snapshot
    let run1 = engine.run(temp.path(), &deep(), None).unwrap();
    let s1 = &run1.snapshot;
    assert_eq!(s1.file_count(), 2);
    assert!(!s1.metadata.is_incremental);
    assert_eq!(s1.metadata.files_analyzed_this_session, 2);
    assert_eq!(run1.changes.added, vec!["a.py", "b.py"]);
    assert_eq!(s1.functions.len(), 3);
    assert_eq!(engine.analyzer().calls(), vec!["a.py", "b.py"]);

    // Run 2: edit b.py
    engine.analyzer().reset();
    fs::write(temp.path().join("b.py"), "def beta\n").unwrap();
    let run2 = engine.run(temp.path(), &deep(), Some(s1)).unwrap();
    let s2 = &run2.snapshot;
    assert_eq!(run2.changes.modified, vec!["b.py"]);
    assert_eq!(run2.changes.unchanged, vec!["a.py"]);
    assert!(run2.changes.added.is_empty() && run2.changes.deleted.is_empty());
    assert_eq!(engine.analyzer().calls(), vec!["b.py"]);
    assert!(s2.metadata.is_incremental);
    assert_eq!(s2.metadata.files_analyzed_this_session, 1);
    assert_eq!(s2.metadata.total_files_considered, 2);
    // a.py carried over verbatim, b.py's stale functions replaced
    assert!(s2.file("a.py").unwrap().same_content(s1.file("a.py").unwrap()));
    assert_eq!(s2.functions_of("b.py").count(), 1);
    assert_eq!(s2.functions_of("a.py").count(), 1);
    assert_eq!(s2.summary.total_functions, 2);

    // Run 3: delete b.py
    engine.analyzer().reset();
    fs::remove_file(temp.path().join("b.py")).unwrap();
    let run3 = engine.run(temp.path(), &deep(), Some(s2)).unwrap();
    let s3 = &run3.snapshot;
    assert_eq!(run3.changes.deleted, vec!["b.py"]);
    assert!(engine.analyzer().calls().is_empty());
    assert_eq!(s3.file_count(), 1);
    assert_eq!(s3.summary.total_files, 1);
    assert_eq!(s3.functions_of("b.py").count(), 0);
    assert_eq!(s3.summary.total_functions, 1);
}

#[test]
fn test_incremental_converges_with_full_run() {
    let temp = project();
    fs::write(temp.path().join("d.py"), "def delta\n").unwrap();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());
    let before = engine.run(temp.path(), &deep(), None).unwrap().snapshot;

    // a.py unchanged, b.py modified, c.py added, d.py deleted
    fs::write(temp.path().join("b.py"), "def beta if\n").unwrap();
    fs::write(temp.path().join("c.py"), "def gamma\n").unwrap();
    fs::remove_file(temp.path().join("d.py")).unwrap();

    let incremental = engine.run(temp.path(), &deep(), Some(&before)).unwrap().snapshot;
    let full = engine.run(temp.path(), &deep(), None).unwrap().snapshot;

    assert_eq!(incremental.file_count(), full.file_count());
    for (a, b) in incremental.files.iter().zip(&full.files) {
        assert!(a.same_content(b), "{} differs", a.relative_path());
    }
    assert_eq!(incremental.functions, full.functions);
    assert_eq!(incremental.summary, full.summary);
}

#[test]
fn test_unchanged_directory_is_idempotent() {
    let temp = project();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());
    let first = engine.run(temp.path(), &deep(), None).unwrap().snapshot;

    engine.analyzer().reset();
    let second = engine.run(temp.path(), &deep(), Some(&first)).unwrap();
    let third = engine.run(temp.path(), &deep(), Some(&second.snapshot)).unwrap();

    assert!(second.changes.is_empty());
    assert!(engine.analyzer().calls().is_empty());
    for run in [&second, &third] {
        assert!(run.snapshot.metadata.is_incremental);
        assert_eq!(run.snapshot.metadata.files_analyzed_this_session, 0);
    }
    assert_eq!(second.snapshot.files, third.snapshot.files);
    assert_eq!(
        serde_json::to_string(&second.snapshot.files).unwrap(),
        serde_json::to_string(&first.files).unwrap()
    );
}

#[test]
fn test_persisted_snapshot_detects_no_false_changes() {
    let temp = project();
    let state_dir = TempDir::new().unwrap();
    let state_path = state_dir.path().join("state.json");
    let engine = IncrementalEngine::new(FakeAnalyzer::default());

    let snapshot = engine.run(temp.path(), &deep(), None).unwrap().snapshot;
    for flat in [false, true] {
        save_state(&state_path, &PersistedState::from_snapshot(&snapshot, flat)).unwrap();
        let reloaded = load_state(&state_path)
            .unwrap()
            .unwrap()
            .into_snapshot(&snapshot.directory_path);

        let scan = DirectoryScanner::new().scan(temp.path(), &deep()).unwrap();
        let changes = detect_changes(&index_records(&scan.records), &reloaded.hashes());
        assert!(changes.is_empty(), "flat = {flat}");
        assert_eq!(changes.unchanged.len(), 2);
    }
}

#[test]
fn test_failed_file_becomes_placeholder_and_is_retried() {
    let temp = project();
    fs::write(temp.path().join("broken.py"), "FAIL\n").unwrap();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());

    let first = engine.run(temp.path(), &deep(), None).unwrap().snapshot;
    let broken = first.file("broken.py").unwrap();
    assert!(broken.is_placeholder());
    assert_eq!(broken.total_lines, 0);
    assert_eq!(first.file_count(), 3);
    assert_eq!(first.summary.total_files_analyzed, 2);
    assert_eq!(first.summary.total_files_not_analyzed, 1);

    engine.analyzer().reset();
    let second = engine.run(temp.path(), &deep(), Some(&first)).unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(engine.analyzer().calls(), vec!["broken.py"]);
    assert_eq!(second.snapshot.metadata.files_analyzed_this_session, 1);
}

#[test]
fn test_parallel_matches_sequential() {
    let temp = project();
    for i in 0..20 {
        fs::write(temp.path().join(format!("m{i:02}.py")), format!("def f{i}{}\n", " if".repeat(i))).unwrap();
    }

    let sequential = IncrementalEngine::new(FakeAnalyzer::default());
    let parallel = IncrementalEngine::new(FakeAnalyzer::default()).with_config(EngineConfig::parallel());

    let a = sequential.run(temp.path(), &deep(), None).unwrap().snapshot;
    let b = parallel.run(temp.path(), &deep(), None).unwrap().snapshot;
    assert_eq!(a.functions, b.functions);
    assert_eq!(a.summary, b.summary);
}

#[test]
fn test_scan_failure_aborts_run() {
    let temp = TempDir::new().unwrap();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());
    assert!(engine.run(&temp.path().join("missing"), &deep(), None).is_err());
}

#[test]
fn test_single_file_target() {
    let temp = project();
    let engine = IncrementalEngine::new(FakeAnalyzer::default());
    let outcome = engine.run(&temp.path().join("b.py"), &deep(), None).unwrap();

    assert_eq!(outcome.snapshot.file_count(), 1);
    assert_eq!(outcome.snapshot.files[0].relative_path(), "b.py");
    assert_eq!(outcome.snapshot.functions.len(), 2);
}

#[test]
fn test_detailed_changes_between_scans() {
    let temp = project();
    let scanner = DirectoryScanner::new();
    let before = index_records(&scanner.scan(temp.path(), &deep()).unwrap().records);
    fs::write(temp.path().join("a.py"), "def changed\n").unwrap();
    let after = index_records(&scanner.scan(temp.path(), &deep()).unwrap().records);

    let detailed = detect_changes_detailed(&after, &before);
    assert_eq!(detailed.len(), 2);
    assert_eq!(detailed[0].change, ChangeKind::Modified);
    assert_ne!(detailed[0].previous_hash, detailed[0].current_hash);
    assert_eq!(detailed[1].change, ChangeKind::Unchanged);
}

#[test]
fn test_heuristic_engine_end_to_end() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("calc.rs"),
        "pub fn add(a: i32, b: i32) -> i32 {\n    if a > b { a } else { b }\n}\n",
    )
    .unwrap();
    let engine = IncrementalEngine::new(HeuristicAnalyzer::new());
    let snapshot = engine.run(temp.path(), &deep(), None).unwrap().snapshot;

    let add = &snapshot.functions[0];
    assert_eq!(add.name, "add");
    assert_eq!(add.owner_relative_path, "calc.rs");
    assert_eq!(add.parameters, 2);
    assert_eq!(add.complexity, 2);
    assert_eq!(snapshot.summary.language_distribution["Rust"], 1);
}
