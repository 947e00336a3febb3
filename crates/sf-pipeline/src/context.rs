//! Progress reporting and stage tracking shared by a pipeline run.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sf_core::PipelineStage;

/// Progress checkpoints of a video job.
pub mod checkpoint {
    pub const RUNNING: u8 = 10;
    pub const FETCHED: u8 = 20;
    pub const PLANNED: u8 = 25;
    pub const CONCATENATED: u8 = 80;
    pub const ENFORCED: u8 = 85;
    pub const UPLOADED: u8 = 95;
    pub const DONE: u8 = 100;

    /// Progress after segment `index` of `count` has rendered: 25 to 75.
    pub fn segment(index: usize, count: usize) -> u8 {
        let count = count.max(1);
        let done = (index + 1).min(count);
        PLANNED + (50 * done / count) as u8
    }
}

/// Sender for reporting progress from within the pipeline.
///
/// Wraps a callback that receives a progress percentage (0 -- 100) and the
/// stage that reached it. Reports that would move progress backwards are
/// dropped, so observers only ever see a non-decreasing sequence.
pub struct ProgressSender {
    callback: Box<dyn Fn(u8, PipelineStage) + Send + Sync>,
    last: AtomicU8,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(u8, PipelineStage) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            last: AtomicU8::new(0),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self::new(|_, _| {})
    }

    /// Report progress.
    pub fn send(&self, progress: u8, stage: PipelineStage) {
        let progress = progress.min(100);
        let previous = self.last.fetch_max(progress, Ordering::AcqRel);
        if progress >= previous {
            (self.callback)(progress, stage);
        }
    }

    /// Highest progress reported so far.
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender")
            .field("last", &self.current())
            .finish_non_exhaustive()
    }
}

/// The stage a run is currently in. Clones share state, so the caller that
/// enforces the job timeout can read where the run was when it expired.
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: Arc<Mutex<PipelineStage>>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(PipelineStage::Fetch)),
        }
    }

    pub fn enter(&self, stage: PipelineStage) {
        *self.current.lock() = stage;
    }

    pub fn current(&self) -> PipelineStage {
        *self.current.lock()
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
