//! Registry of live presentation sessions.
//!
//! Sessions are keyed by (target path, analysis kind). At most one session
//! is live per key. Mutating operations run inside one async critical section
//! so concurrent triggers cannot produce duplicates, and the previous session
//! of a key is fully disposed before its replacement is registered.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SessionError;
use crate::scheduler::SnapshotUpdate;

/// Capacity of the registry change channel.
const EVENT_CHANNEL_SIZE: usize = 64;

/// How a target's results are presented.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Flat dashboard.
    Static,
    /// Immersive scene.
    Xr,
    /// Scene embedded in a document view.
    Dom,
}

/// A presentation surface bound to a session.
pub trait PresentationHandle: Send + Sync {
    /// Release the surface. Called exactly once when the session ends.
    fn dispose(&self);

    /// Bring the surface to the foreground. Returns `false` when the
    /// surface can no longer be shown, in which case the caller should close
    /// the session and start a new one.
    fn reveal(&self) -> bool {
        false
    }

    /// Receive a new snapshot for the session's target.
    fn push_update(&self, _update: &SnapshotUpdate) {}
}

type Key = (PathBuf, AnalysisKind);
type CleanupHook = Box<dyn FnOnce() + Send>;

/// Changes to the registry, for hosts that show the session list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { path: PathBuf, kind: AnalysisKind, id: Uuid },
    Replaced { path: PathBuf, kind: AnalysisKind, old: Uuid, new: Uuid },
    Closed { path: PathBuf, kind: AnalysisKind, id: Uuid },
    /// A session's target received a new snapshot.
    Refreshed { path: PathBuf, kind: AnalysisKind, id: Uuid },
}

/// A live session.
struct AnalysisSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    handle: Arc<dyn PresentationHandle>,
    cleanup: Vec<CleanupHook>,
    cancel: CancellationToken,
}

impl AnalysisSession {
    /// Dispose the handle, cancel bound work and run cleanup hooks.
    fn dispose(self) {
        self.handle.dispose();
        self.cancel.cancel();
        for hook in self.cleanup {
            hook();
        }
    }
}

/// Read-only view of a session.
#[derive(Clone)]
pub struct SessionInfo {
    pub id: Uuid,
    pub target: PathBuf,
    pub kind: AnalysisKind,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, String>,
    pub handle: Arc<dyn PresentationHandle>,
    /// Cancelled when the session closes.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInfo")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Keyed map of live sessions.
pub struct SessionRegistry {
    /// Serializes add/close so the one-session-per-key rule holds across awaits.
    ops: tokio::sync::Mutex<()>,
    sessions: Mutex<IndexMap<Key, AnalysisSession>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            ops: tokio::sync::Mutex::new(()),
            sessions: Mutex::new(IndexMap::new()),
            events,
        }
    }

    /// Register a session, disposing any existing session for the key first.
    pub async fn add_session(
        &self,
        target: &Path,
        kind: AnalysisKind,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
    ) -> SessionInfo {
        self.replace(target, kind, handle, metadata, Vec::new()).await
    }

    /// Like [`add_session`](Self::add_session), with a cleanup hook bound in
    /// the same critical section, so no close can slip in between.
    pub async fn add_session_with_cleanup(
        &self,
        target: &Path,
        kind: AnalysisKind,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
        hook: impl FnOnce() + Send + 'static,
    ) -> SessionInfo {
        self.replace(target, kind, handle, metadata, vec![Box::new(hook)])
            .await
    }

    /// Register a session only if none exists for the key.
    ///
    /// On conflict the caller decides whether to reopen, replace, or cancel.
    pub async fn try_add_session(
        &self,
        target: &Path,
        kind: AnalysisKind,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
    ) -> Result<SessionInfo, SessionError> {
        let _guard = self.ops.lock().await;
        let key = (target.to_path_buf(), kind);
        if self.lock().contains_key(&key) {
            return Err(SessionError::Conflict {
                path: target.to_path_buf(),
                kind,
            });
        }
        let info = self.register(key, handle, metadata, Vec::new());
        let _ = self.events.send(RegistryEvent::Added {
            path: info.target.clone(),
            kind,
            id: info.id,
        });
        Ok(info)
    }

    /// Close a session. Returns `false` if none was open.
    pub async fn close_session(&self, target: &Path, kind: AnalysisKind) -> bool {
        let _guard = self.ops.lock().await;
        let key = (target.to_path_buf(), kind);
        let Some(session) = self.lock().shift_remove(&key) else {
            return false;
        };

        let id = session.id;
        session.dispose();
        info!(path = %target.display(), %kind, %id, "session closed");
        let _ = self.events.send(RegistryEvent::Closed {
            path: key.0,
            kind,
            id,
        });
        true
    }

    /// Close every session.
    pub async fn close_all(&self) -> usize {
        let keys: Vec<Key> = self.lock().keys().cloned().collect();
        let mut closed = 0;
        for (path, kind) in keys {
            if self.close_session(&path, kind).await {
                closed += 1;
            }
        }
        closed
    }

    /// Bring an existing session to the foreground.
    ///
    /// `Ok(false)` means the surface is gone and the session should be
    /// closed and started fresh.
    pub fn reopen_session(&self, target: &Path, kind: AnalysisKind) -> Result<bool, SessionError> {
        let handle = self
            .lock()
            .get(&(target.to_path_buf(), kind))
            .map(|s| Arc::clone(&s.handle))
            .ok_or_else(|| SessionError::NotFound {
                path: target.to_path_buf(),
                kind,
            })?;
        Ok(handle.reveal())
    }

    pub fn has_session(&self, target: &Path, kind: AnalysisKind) -> bool {
        self.lock().contains_key(&(target.to_path_buf(), kind))
    }

    pub fn get_session(&self, target: &Path, kind: AnalysisKind) -> Option<SessionInfo> {
        let key = (target.to_path_buf(), kind);
        self.lock().get(&key).map(|s| Self::info(&key, s))
    }

    /// All live sessions in creation order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.lock()
            .iter()
            .map(|(key, session)| Self::info(key, session))
            .collect()
    }

    /// Whether any session, of any kind, is open for `target`.
    pub fn has_target(&self, target: &Path) -> bool {
        self.lock().keys().any(|(path, _)| path == target)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Attach a hook that runs once when the session closes or is replaced.
    ///
    /// Returns `false` (and drops the hook unrun) if no session is open.
    pub fn add_cleanup(
        &self,
        target: &Path,
        kind: AnalysisKind,
        hook: impl FnOnce() + Send + 'static,
    ) -> bool {
        match self.lock().get_mut(&(target.to_path_buf(), kind)) {
            Some(session) => {
                session.cleanup.push(Box::new(hook));
                true
            }
            None => false,
        }
    }

    /// Forward a snapshot update to every session of its target.
    pub fn push_update(&self, update: &SnapshotUpdate) -> usize {
        let targets: Vec<(AnalysisKind, Uuid, Arc<dyn PresentationHandle>)> = self
            .lock()
            .iter()
            .filter(|((path, _), _)| *path == update.target)
            .map(|((_, kind), s)| (*kind, s.id, Arc::clone(&s.handle)))
            .collect();

        // Handles run outside the lock
        for (kind, id, handle) in &targets {
            handle.push_update(update);
            let _ = self.events.send(RegistryEvent::Refreshed {
                path: update.target.clone(),
                kind: *kind,
                id: *id,
            });
        }
        targets.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    async fn replace(
        &self,
        target: &Path,
        kind: AnalysisKind,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
        cleanup: Vec<CleanupHook>,
    ) -> SessionInfo {
        let _guard = self.ops.lock().await;
        let key = (target.to_path_buf(), kind);

        let previous = self.lock().shift_remove(&key);
        let previous_id = previous.as_ref().map(|s| s.id);
        if let Some(old) = previous {
            debug!(path = %target.display(), %kind, id = %old.id, "replacing session");
            old.dispose();
        }

        let info = self.register(key, handle, metadata, cleanup);
        let event = match previous_id {
            Some(old) => RegistryEvent::Replaced {
                path: info.target.clone(),
                kind,
                old,
                new: info.id,
            },
            None => RegistryEvent::Added {
                path: info.target.clone(),
                kind,
                id: info.id,
            },
        };
        let _ = self.events.send(event);
        info
    }

    fn register(
        &self,
        key: Key,
        handle: Arc<dyn PresentationHandle>,
        metadata: BTreeMap<String, String>,
        cleanup: Vec<CleanupHook>,
    ) -> SessionInfo {
        let session = AnalysisSession {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            metadata,
            handle,
            cleanup,
            cancel: CancellationToken::new(),
        };
        let info = Self::info(&key, &session);
        self.lock().insert(key, session);
        info!(path = %info.target.display(), kind = %info.kind, id = %info.id, "session opened");
        info
    }

    fn info(key: &Key, session: &AnalysisSession) -> SessionInfo {
        SessionInfo {
            id: session.id,
            target: key.0.clone(),
            kind: key.1,
            created_at: session.created_at,
            metadata: session.metadata.clone(),
            handle: Arc::clone(&session.handle),
            cancel: session.cancel.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<Key, AnalysisSession>> {
        // Hooks never run under this lock, so poisoning cannot leave it inconsistent
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}
