//! Progress reporting from render stages.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Sender for reporting progress from within stages.
///
/// Wraps a callback that receives a percentage (0.0 to 100.0) and the name
/// of the stage that produced it.
pub struct ProgressSender {
    callback: Box<dyn Fn(f64, &str) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(f64, &str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_, _| {}),
        }
    }

    /// Report progress.
    pub fn send(&self, progress: f64, stage: &str) {
        (self.callback)(progress, stage);
    }

    /// A sub-range of the bar, advanced one unit of work at a time.
    pub fn span(&self, stage: &'static str, start: f64, end: f64, total: usize) -> ProgressSpan<'_> {
        self.send(start, stage);
        ProgressSpan {
            sender: self,
            stage,
            start,
            end,
            total: total.max(1),
            done: AtomicUsize::new(0),
        }
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// The slice of overall progress owned by one stage.
pub struct ProgressSpan<'a> {
    sender: &'a ProgressSender,
    stage: &'static str,
    start: f64,
    end: f64,
    total: usize,
    done: AtomicUsize,
}

impl ProgressSpan<'_> {
    /// Record one finished unit. Safe to call from concurrent futures.
    pub fn tick(&self) {
        let done = (self.done.fetch_add(1, Ordering::Relaxed) + 1).min(self.total);
        let pct = self.start + (self.end - self.start) * done as f64 / self.total as f64;
        self.sender.send(pct, self.stage);
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}
