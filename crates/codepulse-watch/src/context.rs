//! Process-wide analysis context.
//!
//! Owns the session registry, the set of watched targets and the live
//! configuration. Construct one at startup and pass clones to whatever needs
//! them.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use indexmap::IndexMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use codepulse_core::DirectorySnapshot;

use crate::config::ConfigHandle;
use crate::error::WatchError;
use crate::events::TargetWatcher;
use crate::registry::{AnalysisKind, PresentationHandle, SessionInfo, SessionRegistry};
use crate::scheduler::{SchedulerHandle, SnapshotProducer, TargetEvent, spawn_scheduler};

/// Capacity of the snapshot event channel.
const TARGET_EVENT_CHANNEL_SIZE: usize = 256;

struct WatchedTarget {
    scheduler: SchedulerHandle,
    task: JoinHandle<()>,
    _watcher: TargetWatcher,
}

struct Inner<P> {
    registry: SessionRegistry,
    producer: Arc<P>,
    config: ConfigHandle,
    targets: Mutex<IndexMap<PathBuf, WatchedTarget>>,
    /// Serializes session open/close with the watch bookkeeping around them.
    lifecycle: tokio::sync::Mutex<()>,
    /// Targets kept watched while one of their sessions is being replaced.
    retained: Mutex<HashSet<PathBuf>>,
    events: broadcast::Sender<TargetEvent>,
    cancel: CancellationToken,
}

impl<P> Inner<P> {
    fn targets(&self) -> MutexGuard<'_, IndexMap<PathBuf, WatchedTarget>> {
        self.targets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn retained(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.retained.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Session cleanup: stop watching once no session needs the target.
    fn release(&self, target: &Path) {
        if self.retained().contains(target) || self.registry.has_target(target) {
            return;
        }
        self.unwatch(target);
    }

    fn unwatch(&self, target: &Path) -> bool {
        let Some(watched) = self.targets().shift_remove(target) else {
            return false;
        };
        watched.scheduler.shutdown();
        info!(path = %target.display(), "stopped watching");
        true
    }
}

impl<P> Drop for Inner<P> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Shared handle to the registry, watchers and schedulers.
pub struct AnalysisContext<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for AnalysisContext<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: SnapshotProducer> AnalysisContext<P> {
    /// Create the context. Must be called from within a tokio runtime.
    pub fn new(producer: P, config: ConfigHandle) -> Self {
        let (events, _) = broadcast::channel(TARGET_EVENT_CHANNEL_SIZE);
        let inner = Arc::new(Inner {
            registry: SessionRegistry::new(),
            producer: Arc::new(producer),
            config,
            targets: Mutex::new(IndexMap::new()),
            lifecycle: tokio::sync::Mutex::new(()),
            retained: Mutex::new(HashSet::new()),
            events,
            cancel: CancellationToken::new(),
        });
        spawn_dispatcher(&inner);
        Self { inner }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    pub fn producer(&self) -> &P {
        &self.inner.producer
    }

    /// Receive every completed or failed run across all targets.
    pub fn subscribe(&self) -> broadcast::Receiver<TargetEvent> {
        self.inner.events.subscribe()
    }

    /// Start watching a file or directory.
    ///
    /// `seed` becomes the scheduler's last known snapshot, so the first run
    /// is incremental against it.
    pub fn watch(
        &self,
        target: &Path,
        seed: Option<DirectorySnapshot>,
    ) -> Result<SchedulerHandle, WatchError> {
        let target = std::fs::canonicalize(target).map_err(|_| WatchError::NotFound {
            path: target.to_path_buf(),
        })?;

        let limit = self.inner.config.current().max_watched_targets;
        admit(&self.inner.targets(), &target, limit)?;

        let (scheduler, task) = spawn_scheduler(
            target.clone(),
            Arc::clone(&self.inner.producer),
            self.inner.config.clone(),
            self.inner.events.clone(),
            seed,
            self.inner.cancel.child_token(),
        );
        // Installing a recursive watch walks the tree; keep it outside the lock
        let watcher = match TargetWatcher::start(&target, scheduler.notifier()) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(path = %target.display(), error = %e, "abandoning watch");
                scheduler.shutdown();
                return Err(e);
            }
        };

        let mut targets = self.inner.targets();
        if let Err(e) = admit(&targets, &target, limit) {
            scheduler.shutdown();
            return Err(e);
        }
        info!(path = %target.display(), watched = targets.len() + 1, "watching");
        targets.insert(
            target,
            WatchedTarget {
                scheduler: scheduler.clone(),
                task,
                _watcher: watcher,
            },
        );
        Ok(scheduler)
    }

    /// Stop watching a target. A run in flight completes and is discarded.
    pub fn unwatch(&self, target: &Path) -> bool {
        self.inner.unwatch(&resolve(target))
    }

    pub fn is_watched(&self, target: &Path) -> bool {
        self.inner.targets().contains_key(&resolve(target))
    }

    pub fn watched_targets(&self) -> Vec<PathBuf> {
        self.inner.targets().keys().cloned().collect()
    }

    pub fn scheduler(&self, target: &Path) -> Option<SchedulerHandle> {
        self.inner
            .targets()
            .get(&resolve(target))
            .map(|w| w.scheduler.clone())
    }

    /// Trigger an immediate run for a watched target.
    pub async fn analyze_now(&self, target: &Path) -> Result<(), WatchError> {
        let scheduler = self
            .scheduler(target)
            .ok_or_else(|| WatchError::NotFound {
                path: target.to_path_buf(),
            })?;
        scheduler.analyze_now().await
    }

    /// Open a presentation session, watching the target if needed.
    ///
    /// An existing session for the same key is disposed first. Its target
    /// stays watched across the replacement, so a pending or running
    /// analysis carries over. `seed` only applies when the target is not
    /// watched yet. The target stays watched until its last session closes.
    pub async fn open_session(
        &self,
        target: &Path,
        kind: AnalysisKind,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
        seed: Option<DirectorySnapshot>,
    ) -> Result<SessionInfo, WatchError> {
        let target = std::fs::canonicalize(target).map_err(|_| WatchError::NotFound {
            path: target.to_path_buf(),
        })?;

        let _lifecycle = self.inner.lifecycle.lock().await;
        let _retained = Retained::new(&self.inner, &target);

        let watched = self.inner.targets().contains_key(&target);
        if !watched {
            match self.watch(&target, seed) {
                // Watched directly by the host in the meantime
                Ok(_) | Err(WatchError::AlreadyWatched { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let weak: Weak<Inner<P>> = Arc::downgrade(&self.inner);
        let path = target.clone();
        let session = self
            .inner
            .registry
            .add_session_with_cleanup(&target, kind, handle, metadata, move || {
                if let Some(inner) = weak.upgrade() {
                    inner.release(&path);
                }
            })
            .await;
        Ok(session)
    }

    /// Close a session; unwatches its target if it was the last one.
    pub async fn close_session(&self, target: &Path, kind: AnalysisKind) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.registry.close_session(&resolve(target), kind).await
    }

    /// Close every session, stop every scheduler and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let drained: Vec<WatchedTarget> = self
            .inner
            .targets()
            .drain(..)
            .map(|(_, watched)| watched)
            .collect();
        let closed = self.inner.registry.close_all().await;

        for watched in drained {
            if let Err(e) = watched.task.await {
                warn!(path = %watched.scheduler.target().display(), error = %e, "scheduler task failed");
            }
        }
        debug!(sessions = closed, "analysis context shut down");
    }
}

impl<P> std::fmt::Debug for AnalysisContext<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("registry", &self.inner.registry)
            .field("targets", &self.inner.targets().len())
            .finish_non_exhaustive()
    }
}

/// Forward snapshot updates to the sessions of each target.
fn spawn_dispatcher<P: SnapshotProducer>(inner: &Arc<Inner<P>>) {
    let weak = Arc::downgrade(inner);
    let mut rx = inner.events.subscribe();
    let cancel = inner.cancel.clone();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(TargetEvent::Updated(update)) => {
                    let Some(inner) = weak.upgrade() else { break };
                    let delivered = inner.registry.push_update(&update);
                    trace!(path = %update.target.display(), delivered, "pushed snapshot update");
                }
                Ok(TargetEvent::Failed {
                    target,
                    target_missing: true,
                    ..
                }) => {
                    let Some(inner) = weak.upgrade() else { break };
                    if !target.exists() && inner.unwatch(&target) {
                        warn!(path = %target.display(), "target removed, watching abandoned");
                    }
                }
                Ok(TargetEvent::Failed { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "update dispatcher lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Fails when `target` is already watched or the watch set is full.
fn admit(
    targets: &IndexMap<PathBuf, WatchedTarget>,
    target: &Path,
    limit: usize,
) -> Result<(), WatchError> {
    if targets.contains_key(target) {
        return Err(WatchError::AlreadyWatched {
            path: target.to_path_buf(),
        });
    }
    if targets.len() >= limit {
        return Err(WatchError::TooManyTargets { limit });
    }
    Ok(())
}

/// Marks a target as retained until dropped.
struct Retained<'a, P> {
    inner: &'a Inner<P>,
    target: PathBuf,
}

impl<'a, P> Retained<'a, P> {
    fn new(inner: &'a Inner<P>, target: &Path) -> Self {
        inner.retained().insert(target.to_path_buf());
        Self {
            inner,
            target: target.to_path_buf(),
        }
    }
}

impl<P> Drop for Retained<'_, P> {
    fn drop(&mut self) {
        self.inner.retained().remove(&self.target);
    }
}

/// Canonical form of a path when it still exists, the path itself otherwise.
fn resolve(target: &Path) -> PathBuf {
    std::fs::canonicalize(target).unwrap_or_else(|_| target.to_path_buf())
}
