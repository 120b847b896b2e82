//! Scan progress reporting.

use std::time::{Duration, Instant};

use compact_str::CompactString;
use tokio::sync::broadcast;

/// Progress information during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    /// Files examined so far.
    pub current: u64,
    /// Files known so far.
    pub total: u64,
    /// Whether `total` may still grow (recursive traversal).
    pub total_is_estimate: bool,
    /// Name of the file just examined.
    pub file_name: CompactString,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Fraction complete in `0.0..=1.0`, or `None` while the total is an estimate.
    pub fn fraction(&self) -> Option<f64> {
        if self.total_is_estimate || self.total == 0 {
            None
        } else {
            Some((self.current as f64 / self.total as f64).min(1.0))
        }
    }
}

/// Counts files and forwards throttled progress to subscribers.
#[derive(Debug)]
pub(crate) struct ProgressTracker<'a> {
    tx: &'a broadcast::Sender<ScanProgress>,
    start_time: Instant,
    current: u64,
    total: u64,
    total_is_estimate: bool,
    every: u64,
}

impl<'a> ProgressTracker<'a> {
    /// Tracker for a scan whose file count is known up front.
    pub fn exact(tx: &'a broadcast::Sender<ScanProgress>, total: u64) -> Self {
        Self {
            tx,
            start_time: Instant::now(),
            current: 0,
            total,
            total_is_estimate: false,
            every: 1,
        }
    }

    /// Tracker for a traversal that discovers files as it goes.
    pub fn estimating(tx: &'a broadcast::Sender<ScanProgress>) -> Self {
        Self {
            tx,
            start_time: Instant::now(),
            current: 0,
            total: 0,
            total_is_estimate: true,
            every: 256,
        }
    }

    pub fn record_file(&mut self, file_name: &str) {
        self.current += 1;
        if self.total_is_estimate {
            self.total = self.current;
        }
        if self.current % self.every == 0 {
            self.emit(file_name);
        }
    }

    /// Send a final update regardless of throttling.
    pub fn finish(&mut self) {
        if self.total_is_estimate {
            self.total_is_estimate = false;
        }
        self.emit("");
    }

    fn emit(&self, file_name: &str) {
        if self.tx.receiver_count() == 0 {
            return;
        }
        // No receivers is not an error
        let _ = self.tx.send(ScanProgress {
            current: self.current,
            total: self.total,
            total_is_estimate: self.total_is_estimate,
            file_name: file_name.into(),
            elapsed: self.start_time.elapsed(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_progress() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut tracker = ProgressTracker::exact(&tx, 2);
        tracker.record_file("a.py");
        tracker.record_file("b.py");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.current, 1);
        assert_eq!(first.total, 2);
        assert_eq!(first.file_name, "a.py");
        assert_eq!(rx.try_recv().unwrap().fraction(), Some(1.0));
    }

    #[test]
    fn test_estimating_progress_is_throttled() {
        let (tx, mut rx) = broadcast::channel(16);
        let mut tracker = ProgressTracker::estimating(&tx);
        for _ in 0..300 {
            tracker.record_file("x.rs");
        }
        let update = rx.try_recv().unwrap();
        assert_eq!(update.current, 256);
        assert!(update.total_is_estimate);
        assert_eq!(update.fraction(), None);

        tracker.finish();
        let last = rx.try_recv().unwrap();
        assert_eq!(last.total, 300);
        assert!(!last.total_is_estimate);
        assert!(rx.try_recv().is_err());
    }
}
