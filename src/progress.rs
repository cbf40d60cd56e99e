//! Progress-callback trait for per-job batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::ProcessConfigBuilder::progress_callback`] to receive
//! events as workers pick up and finish jobs.
//!
//! # Example
//!
//! ```rust
//! use handwrite::{BatchProgressCallback, JobOutcome, ProcessConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_job_complete(&self, outcome: &JobOutcome) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {} ok={}", outcome.job.path.display(), outcome.is_success());
//!     }
//! }
//!
//! let config = ProcessConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchSummary, JobOutcome};
use std::path::Path;
use std::sync::Arc;

/// Called by the scheduler as the batch advances.
///
/// Workers run concurrently, so `on_job_start` and `on_job_complete` may be
/// called from several tasks at once and in any job order. Implementations
/// must protect shared mutable state (`Mutex`, atomics). All methods default
/// to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any job is dispatched.
    fn on_batch_start(&self, total_jobs: usize) {
        let _ = total_jobs;
    }

    /// Called when a worker picks up a job.
    fn on_job_start(&self, path: &Path) {
        let _ = path;
    }

    /// Called exactly once per job, whatever the outcome.
    fn on_job_complete(&self, outcome: &JobOutcome) {
        let _ = outcome;
    }

    /// Called once after every job has produced an outcome.
    fn on_batch_complete(&self, summary: &BatchSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;
    use crate::output::Job;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        successes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_job_start(&self, _path: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_job_complete(&self, outcome: &JobOutcome) {
            if outcome.is_success() {
                self.successes.fetch_add(1, Ordering::SeqCst);
            } else {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_job_start(Path::new("a.png"));
        cb.on_job_complete(&JobOutcome::success(Job::new("a.png"), PathBuf::from("out/a.md")));
        cb.on_batch_complete(&BatchSummary::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_job_start(Path::new("a.png"));
        tracker.on_job_complete(&JobOutcome::success(Job::new("a.png"), PathBuf::from("a.md")));
        tracker.on_job_start(Path::new("b.png"));
        tracker.on_job_complete(&JobOutcome::failure(
            Job::new("b.png"),
            JobError::Timeout { secs: 300 },
        ));

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.successes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }
}
