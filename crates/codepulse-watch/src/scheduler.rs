//! Per-target debounce scheduler.
//!
//! Each watched target owns one task running a three-state machine:
//!
//! ```text
//!  Idle ──change──▶ PendingDebounce ──deadline──▶ Running ──done──▶ Idle
//!                    ▲      │ change resets         │ change marks dirty
//!                    └──────┘ the deadline          ▼
//!                                     done + dirty ─▶ PendingDebounce
//! ```
//!
//! A run executes on the blocking pool and is never preempted. At most one
//! run per target is in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use codepulse_analyze::{ChangeSet, FileAnalyzer, IncrementalEngine, RunOutcome};
use codepulse_core::{DirectorySnapshot, ScanError, ScanFilters};

use crate::config::ConfigHandle;
use crate::error::WatchError;

/// Queue depth for scheduler commands.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// How often the pending countdown is republished.
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Something that can produce a snapshot of a target.
pub trait SnapshotProducer: Send + Sync + 'static {
    fn produce(
        &self,
        target: &Path,
        filters: &ScanFilters,
        previous: Option<&DirectorySnapshot>,
    ) -> Result<RunOutcome, ScanError>;
}

impl<A: FileAnalyzer + 'static> SnapshotProducer for IncrementalEngine<A> {
    fn produce(
        &self,
        target: &Path,
        filters: &ScanFilters,
        previous: Option<&DirectorySnapshot>,
    ) -> Result<RunOutcome, ScanError> {
        self.run(target, filters, previous)
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Idle,
    /// Waiting for the debounce window to settle.
    PendingDebounce { remaining: Duration },
    Running,
}

/// A completed run that replaced a target's last known snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub target: PathBuf,
    pub snapshot: Arc<DirectorySnapshot>,
    pub changes: ChangeSet,
}

/// Events published by schedulers.
#[derive(Debug, Clone)]
pub enum TargetEvent {
    Updated(Arc<SnapshotUpdate>),
    /// The run aborted; the previous snapshot remains current.
    Failed {
        target: PathBuf,
        message: String,
        /// The target itself no longer exists.
        target_missing: bool,
    },
}

impl TargetEvent {
    pub fn target(&self) -> &Path {
        match self {
            Self::Updated(update) => &update.target,
            Self::Failed { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Changed,
    AnalyzeNow,
}

/// Sends change notifications into a scheduler. Cheap to clone and usable
/// from non-async contexts such as filesystem watcher callbacks.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: mpsc::Sender<Command>,
}

impl ChangeNotifier {
    /// Report a filesystem change. Returns `false` once the scheduler is gone.
    pub fn notify(&self) -> bool {
        match self.tx.try_send(Command::Changed) {
            Ok(()) => true,
            // A full queue already holds a pending change
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

/// Handle to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    target: PathBuf,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SchedulerStatus>,
    latest: watch::Receiver<Option<Arc<DirectorySnapshot>>>,
    cancel: CancellationToken,
}

impl SchedulerHandle {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Report a filesystem change.
    pub fn notify_change(&self) -> Result<(), WatchError> {
        if self.notifier().notify() {
            Ok(())
        } else {
            Err(self.closed())
        }
    }

    /// Run as soon as possible, skipping the debounce window. Manual runs
    /// happen even with auto-analysis disabled and are never discarded.
    pub async fn analyze_now(&self) -> Result<(), WatchError> {
        self.commands
            .send(Command::AnalyzeNow)
            .await
            .map_err(|_| self.closed())
    }

    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier {
            tx: self.commands.clone(),
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status.borrow()
    }

    /// Receiver for status changes, e.g. to render a countdown.
    pub fn status_receiver(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// The last known snapshot. Replaced atomically on every completed run.
    pub fn latest(&self) -> Option<Arc<DirectorySnapshot>> {
        self.latest.borrow().clone()
    }

    pub fn latest_receiver(&self) -> watch::Receiver<Option<Arc<DirectorySnapshot>>> {
        self.latest.clone()
    }

    /// Stop the scheduler. A run in flight finishes and its result is dropped.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn closed(&self) -> WatchError {
        WatchError::Closed {
            path: self.target.clone(),
        }
    }
}

/// Spawn a scheduler task for `target`.
///
/// `seed` becomes the initial last known snapshot, typically loaded from a
/// persisted document. Must be called from within a tokio runtime.
pub fn spawn_scheduler<P: SnapshotProducer>(
    target: PathBuf,
    producer: Arc<P>,
    config: ConfigHandle,
    events: broadcast::Sender<TargetEvent>,
    seed: Option<DirectorySnapshot>,
    cancel: CancellationToken,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (status_tx, status_rx) = watch::channel(SchedulerStatus::Idle);
    let (latest_tx, latest_rx) = watch::channel(seed.map(Arc::new));

    let task = SchedulerTask {
        target: target.clone(),
        producer,
        config,
        commands: cmd_rx,
        status: status_tx,
        latest: latest_tx,
        events,
        cancel: cancel.clone(),
    };
    let join = tokio::spawn(task.run());

    let handle = SchedulerHandle {
        target,
        commands: cmd_tx,
        status: status_rx,
        latest: latest_rx,
        cancel,
    };
    (handle, join)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Debounced,
    Manual,
}

/// What to do once the current run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rerun {
    Debounce,
    Now,
}

struct Run {
    handle: JoinHandle<Result<RunOutcome, ScanError>>,
    trigger: Trigger,
    rerun: Option<Rerun>,
    stopping: bool,
    started: Instant,
}

enum State {
    Idle,
    PendingDebounce { deadline: Instant },
    Running(Run),
}

struct SchedulerTask<P> {
    target: PathBuf,
    producer: Arc<P>,
    config: ConfigHandle,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<SchedulerStatus>,
    latest: watch::Sender<Option<Arc<DirectorySnapshot>>>,
    events: broadcast::Sender<TargetEvent>,
    cancel: CancellationToken,
}

impl<P: SnapshotProducer> SchedulerTask<P> {
    async fn run(mut self) {
        debug!(path = %self.target.display(), "scheduler started");
        let mut state = State::Idle;

        loop {
            state = match state {
                State::Idle => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        cmd = self.commands.recv() => match cmd {
                            None => break,
                            Some(Command::Changed) => self.arm(),
                            Some(Command::AnalyzeNow) => self.start(Trigger::Manual),
                        },
                    }
                }
                State::PendingDebounce { deadline } => {
                    let tick = deadline.min(Instant::now() + COUNTDOWN_TICK);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        cmd = self.commands.recv() => match cmd {
                            None => break,
                            Some(Command::Changed) => self.arm(),
                            Some(Command::AnalyzeNow) => self.start(Trigger::Manual),
                        },
                        _ = sleep_until(tick) => {
                            let now = Instant::now();
                            if now < deadline {
                                self.set_status(SchedulerStatus::PendingDebounce {
                                    remaining: deadline - now,
                                });
                                State::PendingDebounce { deadline }
                            } else if self.config.current().auto_analysis {
                                self.start(Trigger::Debounced)
                            } else {
                                debug!(path = %self.target.display(), "auto-analysis disabled, skipping run");
                                self.set_status(SchedulerStatus::Idle);
                                State::Idle
                            }
                        }
                    }
                }
                State::Running(mut run) => {
                    tokio::select! {
                        result = &mut run.handle => {
                            self.finish(result, &run);
                            if run.stopping {
                                break;
                            }
                            match run.rerun {
                                Some(Rerun::Now) => self.start(Trigger::Manual),
                                Some(Rerun::Debounce) => self.arm(),
                                None => {
                                    self.set_status(SchedulerStatus::Idle);
                                    State::Idle
                                }
                            }
                        }
                        _ = self.cancel.cancelled(), if !run.stopping => {
                            // Let the run finish; its result is discarded.
                            run.stopping = true;
                            State::Running(run)
                        }
                        cmd = self.commands.recv(), if !run.stopping => {
                            match cmd {
                                Some(Command::Changed) => {
                                    run.rerun.get_or_insert(Rerun::Debounce);
                                }
                                Some(Command::AnalyzeNow) => run.rerun = Some(Rerun::Now),
                                None => run.stopping = true,
                            }
                            State::Running(run)
                        }
                    }
                }
            };
        }

        self.set_status(SchedulerStatus::Idle);
        debug!(path = %self.target.display(), "scheduler stopped");
    }

    /// Enter (or restart) the debounce window.
    fn arm(&self) -> State {
        let debounce = self.config.current().debounce();
        self.set_status(SchedulerStatus::PendingDebounce {
            remaining: debounce,
        });
        State::PendingDebounce {
            deadline: Instant::now() + debounce,
        }
    }

    fn start(&self, trigger: Trigger) -> State {
        let filters = self.config.current().filters;
        let producer = Arc::clone(&self.producer);
        let target = self.target.clone();
        let previous = self.latest.borrow().clone();

        debug!(path = %self.target.display(), ?trigger, "starting analysis run");
        let handle = tokio::task::spawn_blocking(move || {
            producer.produce(&target, &filters, previous.as_deref())
        });
        self.set_status(SchedulerStatus::Running);

        State::Running(Run {
            handle,
            trigger,
            rerun: None,
            stopping: false,
            started: Instant::now(),
        })
    }

    fn finish(&self, result: Result<Result<RunOutcome, ScanError>, JoinError>, run: &Run) {
        let elapsed = run.started.elapsed();
        match result {
            Ok(Ok(outcome)) => {
                if run.stopping {
                    debug!(path = %self.target.display(), "target unwatched during run, result discarded");
                    return;
                }
                if run.trigger == Trigger::Debounced && !self.config.current().auto_analysis {
                    debug!(path = %self.target.display(), "auto-analysis disabled during run, result discarded");
                    return;
                }

                let snapshot = Arc::new(outcome.snapshot);
                self.latest.send_replace(Some(Arc::clone(&snapshot)));
                info!(
                    path = %self.target.display(),
                    files = snapshot.file_count(),
                    changed = outcome.changes.changed_count(),
                    ?elapsed,
                    "snapshot updated"
                );
                // No subscribers is fine
                let _ = self.events.send(TargetEvent::Updated(Arc::new(SnapshotUpdate {
                    target: self.target.clone(),
                    snapshot,
                    changes: outcome.changes,
                })));
            }
            Ok(Err(e)) => {
                warn!(path = %self.target.display(), error = %e, "analysis run aborted, keeping previous snapshot");
                let target_missing =
                    matches!(e, ScanError::NotFound { .. }) && !self.target.exists();
                let _ = self.events.send(TargetEvent::Failed {
                    target: self.target.clone(),
                    message: e.to_string(),
                    target_missing,
                });
            }
            Err(e) => {
                error!(path = %self.target.display(), error = %e, "analysis task failed");
                let _ = self.events.send(TargetEvent::Failed {
                    target: self.target.clone(),
                    message: format!("Task failed: {e}"),
                    target_missing: false,
                });
            }
        }
    }

    fn set_status(&self, status: SchedulerStatus) {
        self.status.send_replace(status);
    }
}
