//! Hash-based change detection.
//!
//! Pure functions comparing the current hashed file list against the
//! previous one. Both inputs are maps ordered by relative path, so the
//! comparison is one merge walk over both sides, O(n + m).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use codepulse_core::{ContentHash, FileRecord};

/// Relative path to content hash.
pub type HashIndex = BTreeMap<String, ContentHash>;

/// Build a [`HashIndex`] from scanned records.
pub fn index_records(records: &[FileRecord]) -> HashIndex {
    records
        .iter()
        .map(|r| (r.relative_path.clone(), r.content_hash))
        .collect()
}

/// Classification of one file between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

/// Files grouped by how they changed, each list sorted by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    /// Whether nothing was added, modified or deleted.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Number of added, modified and deleted files.
    pub fn changed_count(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Classification of a path, or `None` if it appears in neither list.
    pub fn kind_of(&self, relative_path: &str) -> Option<ChangeKind> {
        let contains = |list: &[String]| {
            list.binary_search_by(|p| p.as_str().cmp(relative_path))
                .is_ok()
        };
        if contains(&self.added) {
            Some(ChangeKind::Added)
        } else if contains(&self.modified) {
            Some(ChangeKind::Modified)
        } else if contains(&self.deleted) {
            Some(ChangeKind::Deleted)
        } else if contains(&self.unchanged) {
            Some(ChangeKind::Unchanged)
        } else {
            None
        }
    }
}

/// Compare current hashes against previous hashes.
pub fn detect_changes(current: &HashIndex, previous: &HashIndex) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for record in detect_changes_detailed(current, previous) {
        let list = match record.change {
            ChangeKind::Added => &mut changes.added,
            ChangeKind::Modified => &mut changes.modified,
            ChangeKind::Deleted => &mut changes.deleted,
            ChangeKind::Unchanged => &mut changes.unchanged,
        };
        list.push(record.relative_path);
    }
    changes
}

/// One file's change with both hashes, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub relative_path: String,
    pub change: ChangeKind,
    pub previous_hash: Option<ContentHash>,
    pub current_hash: Option<ContentHash>,
}

/// Per-file change records over the union of both maps, sorted by path.
pub fn detect_changes_detailed(current: &HashIndex, previous: &HashIndex) -> Vec<FileChange> {
    let mut records = Vec::with_capacity(current.len().max(previous.len()));
    let mut cur = current.iter().peekable();
    let mut prev = previous.iter().peekable();

    loop {
        let record = match (cur.peek(), prev.peek()) {
            (None, None) => break,
            (Some((path, hash)), None) => {
                let r = added(path, **hash);
                cur.next();
                r
            }
            (None, Some((path, hash))) => {
                let r = deleted(path, **hash);
                prev.next();
                r
            }
            (Some((cp, ch)), Some((pp, ph))) => match cp.cmp(pp) {
                std::cmp::Ordering::Less => {
                    let r = added(cp, **ch);
                    cur.next();
                    r
                }
                std::cmp::Ordering::Greater => {
                    let r = deleted(pp, **ph);
                    prev.next();
                    r
                }
                std::cmp::Ordering::Equal => {
                    let change = if ch == ph {
                        ChangeKind::Unchanged
                    } else {
                        ChangeKind::Modified
                    };
                    let r = FileChange {
                        relative_path: (*cp).clone(),
                        change,
                        previous_hash: Some(**ph),
                        current_hash: Some(**ch),
                    };
                    cur.next();
                    prev.next();
                    r
                }
            },
        };
        records.push(record);
    }

    records
}

fn added(path: &str, hash: ContentHash) -> FileChange {
    FileChange {
        relative_path: path.to_string(),
        change: ChangeKind::Added,
        previous_hash: None,
        current_hash: Some(hash),
    }
}

fn deleted(path: &str, hash: ContentHash) -> FileChange {
    FileChange {
        relative_path: path.to_string(),
        change: ChangeKind::Deleted,
        previous_hash: Some(hash),
        current_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn h(b: u8) -> ContentHash {
        ContentHash::new([b; 32])
    }

    fn index(entries: &[(&str, u8)]) -> HashIndex {
        entries.iter().map(|(p, b)| (p.to_string(), h(*b))).collect()
    }

    #[test]
    fn test_classification() {
        let previous = index(&[("a.py", 1), ("b.py", 2), ("c.py", 3)]);
        let current = index(&[("a.py", 1), ("b.py", 9), ("d.py", 4)]);

        let changes = detect_changes(&current, &previous);
        assert_eq!(changes.added, vec!["d.py"]);
        assert_eq!(changes.modified, vec!["b.py"]);
        assert_eq!(changes.deleted, vec!["c.py"]);
        assert_eq!(changes.unchanged, vec!["a.py"]);
        assert_eq!(changes.changed_count(), 3);
        assert_eq!(changes.kind_of("c.py"), Some(ChangeKind::Deleted));
        assert_eq!(changes.kind_of("zzz.py"), None);
    }

    #[test]
    fn test_no_previous_means_all_added() {
        let current = index(&[("a.py", 1), ("b.py", 2)]);
        let changes = detect_changes(&current, &HashIndex::new());
        assert_eq!(changes.added.len(), 2);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn test_identical_inputs_are_empty() {
        let current = index(&[("a.py", 1), ("lib/b.rs", 2)]);
        let changes = detect_changes(&current, &current.clone());
        assert!(changes.is_empty());
        assert_eq!(changes.unchanged.len(), 2);
    }

    #[test]
    fn test_interleaved_paths_stay_sorted() {
        let previous = index(&[("a/x.rs", 1), ("b.rs", 2), ("d.rs", 3), ("f.rs", 4)]);
        let current = index(&[("a/w.rs", 5), ("b.rs", 2), ("c.rs", 6), ("f.rs", 7), ("g.rs", 8)]);

        let changes = detect_changes(&current, &previous);
        assert_eq!(changes.added, vec!["a/w.rs", "c.rs", "g.rs"]);
        assert_eq!(changes.deleted, vec!["a/x.rs", "d.rs"]);
        assert_eq!(changes.modified, vec!["f.rs"]);
        assert_eq!(changes.unchanged, vec!["b.rs"]);
    }

    /// Exhaustive check over every assignment of three paths to
    /// {absent, hash 1, hash 2} on each side.
    #[test]
    fn test_completeness_exhaustive() {
        let paths = ["a", "b", "c"];
        let states = [None, Some(1u8), Some(2u8)];
        let total = states.len().pow(paths.len() as u32);

        for cur_code in 0..total {
            for prev_code in 0..total {
                let build = |mut code: usize| {
                    let mut map = HashIndex::new();
                    for p in paths {
                        if let Some(b) = states[code % states.len()] {
                            map.insert(p.to_string(), h(b));
                        }
                        code /= states.len();
                    }
                    map
                };
                let current = build(cur_code);
                let previous = build(prev_code);
                let changes = detect_changes(&current, &previous);

                let set = |lists: &[&Vec<String>]| -> BTreeSet<String> {
                    lists.iter().flat_map(|l| l.iter().cloned()).collect()
                };
                let cur_keys: BTreeSet<String> = current.keys().cloned().collect();
                let prev_keys: BTreeSet<String> = previous.keys().cloned().collect();

                assert_eq!(
                    set(&[&changes.added, &changes.modified, &changes.unchanged]),
                    cur_keys
                );
                assert_eq!(
                    set(&[&changes.deleted, &changes.modified, &changes.unchanged]),
                    prev_keys
                );

                let detailed = detect_changes_detailed(&current, &previous);
                assert_eq!(detailed.len(), cur_keys.union(&prev_keys).count());
                for record in &detailed {
                    assert_eq!(changes.kind_of(&record.relative_path), Some(record.change));
                }
            }
        }
    }

    #[test]
    fn test_detailed_records_carry_hashes() {
        let previous = index(&[("a.py", 1), ("b.py", 2)]);
        let current = index(&[("b.py", 3), ("c.py", 4)]);

        let detailed = detect_changes_detailed(&current, &previous);
        let paths: Vec<_> = detailed.iter().map(|r| r.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "b.py", "c.py"]);

        assert_eq!(detailed[0].change, ChangeKind::Deleted);
        assert_eq!(detailed[0].current_hash, None);
        assert_eq!(detailed[1].change, ChangeKind::Modified);
        assert_eq!(detailed[1].previous_hash, Some(h(2)));
        assert_eq!(detailed[1].current_hash, Some(h(3)));
        assert_eq!(detailed[2].change, ChangeKind::Added);
        assert_eq!(ChangeKind::Added.to_string(), "added");
    }
}
