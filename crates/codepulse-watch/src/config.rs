//! Live configuration shared by every scheduler.

use std::sync::Arc;

use tokio::sync::watch;

use codepulse_core::WatchConfig;

/// Cloneable handle to the current [`WatchConfig`].
///
/// Schedulers read the value when they arm a debounce window and when they
/// start a run. A run in flight keeps the configuration it started with.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<WatchConfig>>,
}

impl ConfigHandle {
    pub fn new(config: WatchConfig) -> Self {
        let (tx, _) = watch::channel(config);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> WatchConfig {
        self.tx.borrow().clone()
    }

    /// Replace the configuration.
    pub fn update(&self, config: WatchConfig) {
        tracing::debug!(
            debounce_ms = config.debounce().as_millis() as u64,
            auto_analysis = config.auto_analysis,
            "watch configuration updated"
        );
        self.tx.send_replace(config);
    }

    /// Modify the configuration in place.
    pub fn modify(&self, f: impl FnOnce(&mut WatchConfig)) {
        let mut config = self.current();
        f(&mut config);
        self.update(config);
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> watch::Receiver<WatchConfig> {
        self.tx.subscribe()
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(WatchConfig::default())
    }
}
