use codepulse_core::{
    ContentHash, DirectorySnapshot, FileMetrics, FileRecord, FileTotals, FunctionMetrics,
    Language, PersistedState, ScanCounts, ScanFilters, SnapshotMetadata, SnapshotStore, Summary,
    load_state, save_state,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn file(path: &str, hash_byte: u8) -> FileMetrics {
    let record = FileRecord {
        relative_path: path.to_string(),
        absolute_path: PathBuf::from("/project").join(path),
        language: Language::from_path(path).unwrap(),
        size_bytes: 64,
        content_hash: ContentHash::new([hash_byte; 32]),
    };
    let function = FunctionMetrics {
        name: "main".into(),
        owner_relative_path: path.to_string(),
        start_line: 1,
        end_line: 3,
        length: 3,
        parameters: 0,
        complexity: 2,
        density: 2.0 / 3.0,
    };
    FileMetrics::new(
        record,
        FileTotals {
            total_lines: 3,
            comment_lines: 0,
            class_count: 0,
        },
        &[function],
        Utc::now(),
        1,
    )
}

fn snapshot(files: Vec<FileMetrics>) -> DirectorySnapshot {
    let counts = ScanCounts {
        total_files: files.len() as u64,
        analyzable_files: files.len() as u64,
        non_analyzable_files: 0,
    };
    let functions = files
        .iter()
        .map(|f| FunctionMetrics {
            name: "main".into(),
            owner_relative_path: f.relative_path().to_string(),
            start_line: 1,
            end_line: 3,
            length: 3,
            parameters: 0,
            complexity: 2,
            density: 2.0 / 3.0,
        })
        .collect();
    DirectorySnapshot {
        directory_path: PathBuf::from("/project"),
        summary: Summary::compute("/project", &files, counts),
        metadata: SnapshotMetadata {
            version: "test".to_string(),
            is_incremental: false,
            files_analyzed_this_session: files.len() as u64,
            total_files_considered: files.len() as u64,
            filters: ScanFilters::deep(),
            timestamp: Utc::now(),
            duration_ms: 5,
        },
        files,
        functions,
    }
}

#[test]
fn test_full_state_round_trip_preserves_hashes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state.json");
    let original = snapshot(vec![file("a.py", 1), file("b.py", 2)]);

    save_state(&path, &PersistedState::from_snapshot(&original, false)).unwrap();
    let loaded = load_state(&path).unwrap().unwrap();

    assert!(matches!(loaded, PersistedState::Full(_)));
    let restored = loaded.into_snapshot(Path::new("/project"));
    assert_eq!(restored.hashes(), original.hashes());
    assert_eq!(restored.functions.len(), 2);
    assert_eq!(restored.summary, original.summary);
}

#[test]
fn test_flat_state_round_trip_rebuilds_summary() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flat.json");
    let original = snapshot(vec![file("b.py", 2), file("a.py", 1)]);

    save_state(&path, &PersistedState::from_snapshot(&original, true)).unwrap();
    let restored = load_state(&path)
        .unwrap()
        .unwrap()
        .into_snapshot(Path::new("/project"));

    assert_eq!(restored.hashes(), original.hashes());
    assert!(restored.functions.is_empty());
    assert_eq!(restored.summary.total_files, 2);
    // Flat documents are re-sorted on load
    assert_eq!(restored.files[0].relative_path(), "a.py");
    assert!(restored.file("b.py").is_some());
}

#[test]
fn test_document_is_tagged() {
    let state = PersistedState::Flat(vec![file("a.py", 1)]);
    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(value["kind"], "flat");
    assert!(value["payload"].is_array());
    assert_eq!(value["payload"][0]["content_hash"], "01".repeat(32));
}

#[test]
fn test_missing_state_is_none() {
    let temp = TempDir::new().unwrap();
    assert!(load_state(&temp.path().join("absent.json")).unwrap().is_none());
}

#[test]
fn test_malformed_state_is_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.json");
    std::fs::write(&path, "{\"kind\": \"full\"").unwrap();
    assert!(load_state(&path).is_err());
}

#[test]
fn test_store_paths_are_stable_and_distinct() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path().join("snapshots"));

    let a = store.path_for(Path::new("/home/dev/project"));
    let b = store.path_for(Path::new("/home/dev/other"));
    assert_eq!(a, store.path_for(Path::new("/home/dev/project")));
    assert_ne!(a, b);
    assert!(a.starts_with(store.dir()));
    assert_eq!(a.extension().unwrap(), "json");
}

#[test]
fn test_store_save_creates_directory() {
    let temp = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp.path().join("nested").join("snapshots"));
    let target = Path::new("/project");
    let state = PersistedState::from_snapshot(&snapshot(vec![file("main.go", 9)]), false);

    let written = store.save(target, &state).unwrap();
    assert!(written.exists());
    assert_eq!(store.load(target).unwrap(), Some(state));
}

#[test]
fn test_snapshot_lookup() {
    let snap = snapshot(vec![file("a.py", 1), file("lib/b.rs", 2)]);
    assert_eq!(snap.file_count(), 2);
    assert!(snap.file("lib/b.rs").is_some());
    assert!(snap.file("missing.py").is_none());
    assert_eq!(snap.functions_of("a.py").count(), 1);
}
