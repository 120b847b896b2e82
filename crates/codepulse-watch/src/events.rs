//! Filesystem event source feeding a scheduler.

use std::path::{Component, Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use codepulse_scan::WELL_KNOWN_SKIP_DIRS;

use crate::error::WatchError;
use crate::scheduler::ChangeNotifier;

/// Keeps a notify watcher alive for one target.
///
/// Dropping the value stops event delivery.
pub struct TargetWatcher {
    target: PathBuf,
    _watcher: RecommendedWatcher,
}

impl TargetWatcher {
    /// Start watching `target`, forwarding relevant events to `notifier`.
    ///
    /// Directories are watched recursively. A single file is watched through
    /// its parent directory so editors that replace the file on save are
    /// still observed.
    pub fn start(target: &Path, notifier: ChangeNotifier) -> Result<Self, WatchError> {
        let setup_err = |message: String| WatchError::Setup {
            path: target.to_path_buf(),
            message,
        };

        let metadata = std::fs::metadata(target).map_err(|e| setup_err(e.to_string()))?;
        let (watch_path, mode, filter) = if metadata.is_dir() {
            (
                target.to_path_buf(),
                RecursiveMode::Recursive,
                EventFilter::Tree(target.to_path_buf()),
            )
        } else {
            let parent = target
                .parent()
                .ok_or_else(|| setup_err("file has no parent directory".to_string()))?;
            (
                parent.to_path_buf(),
                RecursiveMode::NonRecursive,
                EventFilter::File(target.to_path_buf()),
            )
        };

        let root = target.to_path_buf();
        let handler = move |event: notify::Result<Event>| {
            if let Err(e) = &event {
                warn!(path = %root.display(), error = %e, "watcher error, treating as a change");
            }
            if filter.triggers(&event) {
                trace!(path = %root.display(), "relevant change");
                notifier.notify();
            }
        };

        let mut watcher = RecommendedWatcher::new(handler, notify::Config::default())
            .map_err(|e| setup_err(e.to_string()))?;
        watcher
            .watch(&watch_path, mode)
            .map_err(|e| setup_err(e.to_string()))?;

        debug!(path = %target.display(), "filesystem watcher installed");
        Ok(Self {
            target: target.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl std::fmt::Debug for TargetWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetWatcher")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Decides which event paths can affect a target's snapshot.
#[derive(Debug, Clone)]
enum EventFilter {
    Tree(PathBuf),
    File(PathBuf),
}

impl EventFilter {
    /// Whether an event should schedule a run.
    ///
    /// Errors and rescan notices mean events were lost, so the target is
    /// treated as changed.
    fn triggers(&self, event: &notify::Result<Event>) -> bool {
        let event = match event {
            Ok(event) => event,
            Err(_) => return true,
        };
        if event.need_rescan() {
            return true;
        }
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                event.paths.iter().any(|p| self.is_relevant(p))
            }
            _ => false,
        }
    }

    fn is_relevant(&self, path: &Path) -> bool {
        match self {
            Self::File(file) => path == file,
            Self::Tree(root) => match path.strip_prefix(root) {
                Ok(rel) => !is_ignored_relative(rel),
                Err(_) => false,
            },
        }
    }
}

/// Whether any component of a path below the root is a hidden or
/// well-known non-source directory.
fn is_ignored_relative(rel: &Path) -> bool {
    let mut components = rel.components().peekable();
    while let Some(component) = components.next() {
        let Component::Normal(name) = component else {
            continue;
        };
        let Some(name) = name.to_str() else { continue };
        let is_last = components.peek().is_none();
        if is_last {
            // Dotfiles themselves can be sources; only directories are skipped
            return false;
        }
        if name.starts_with('.') || WELL_KNOWN_SKIP_DIRS.contains(&name) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_filter() {
        let filter = EventFilter::Tree(PathBuf::from("/project"));
        assert!(filter.is_relevant(Path::new("/project/src/main.rs")));
        assert!(filter.is_relevant(Path::new("/project/app.py")));
        assert!(!filter.is_relevant(Path::new("/project/.git/index")));
        assert!(!filter.is_relevant(Path::new("/project/node_modules/x/index.js")));
        assert!(!filter.is_relevant(Path::new("/project/target/debug/build.rs")));
        assert!(!filter.is_relevant(Path::new("/elsewhere/main.rs")));
    }

    #[test]
    fn test_file_filter() {
        let filter = EventFilter::File(PathBuf::from("/project/main.rs"));
        assert!(filter.is_relevant(Path::new("/project/main.rs")));
        assert!(!filter.is_relevant(Path::new("/project/other.rs")));
    }

    #[test]
    fn test_lost_events_trigger_a_run() {
        use notify::event::{AccessKind, CreateKind, Flag};

        let filter = EventFilter::Tree(PathBuf::from("/project"));
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/project/app.py"));
        assert!(filter.triggers(&Ok(created)));

        // Queue overflow arrives as a pathless rescan notice
        let overflow = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        assert!(filter.triggers(&Ok(overflow)));
        assert!(filter.triggers(&Err(notify::Error::generic("watch descriptor lost"))));

        assert!(!filter.triggers(&Ok(Event::new(EventKind::Other))));
        let read = Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/project/app.py"));
        assert!(!filter.triggers(&Ok(read)));
        let ignored = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/project/.git/index"));
        assert!(!filter.triggers(&Ok(ignored)));
    }

    #[test]
    fn test_missing_target_is_setup_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = TargetWatcher::start(&temp.path().join("gone"), ChangeNotifier::detached())
            .unwrap_err();
        assert!(matches!(err, WatchError::Setup { .. }));
    }
}
