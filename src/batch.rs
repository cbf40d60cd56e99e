//! Batch scheduler: a fixed pool of workers draining a shared job queue.
//!
//! ## Design
//!
//! ```text
//!             ┌──────────┐
//!   jobs ───▶ │  queue   │ ──pop──▶ worker 1 ─┐
//!  (all, up   │ (mpsc,   │ ──pop──▶ worker 2 ─┼──▶ results ──▶ Aggregator ──▶ BatchSummary
//!   front)    │ Mutex'd) │ ──pop──▶ worker W ─┘    (mpsc)
//!             └──────────┘
//! ```
//!
//! The queue and results channels are both sized to the job count so neither
//! the producer nor a worker ever waits on capacity. Each worker is a tokio
//! task looping pop → [`FileProcessor::process`] → push outcome until the
//! queue is empty. The scheduler joins every worker before the aggregator
//! drains the results, so the summary always covers every job.
//!
//! Jobs finish in no particular order. A worker panic is reported as
//! [`HandwriteError::Internal`] after the remaining workers have finished.

use crate::config::ProcessConfig;
use crate::error::HandwriteError;
use crate::output::{BatchSummary, Job, JobOutcome};
use crate::pipeline::discover;
use crate::pipeline::llm::InferencePort;
use crate::process::FileProcessor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Runs a set of jobs through the per-file pipeline with bounded parallelism.
pub struct BatchProcessor {
    config: Arc<ProcessConfig>,
    inference: Arc<dyn InferencePort>,
}

impl BatchProcessor {
    pub fn new(config: ProcessConfig, inference: Arc<dyn InferencePort>) -> Self {
        Self {
            config: Arc::new(config),
            inference,
        }
    }

    /// Process every job exactly once, writing notes into `output_dir`.
    ///
    /// Returns only after each job has produced an outcome. Per-job failures
    /// are counted in the summary, never returned as `Err`.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        output_dir: &Path,
    ) -> Result<BatchSummary, HandwriteError> {
        let start = Instant::now();
        let total = jobs.len();
        let processor = Arc::new(FileProcessor::new(
            Arc::clone(&self.config),
            Arc::clone(&self.inference),
            output_dir,
        ));
        let callback = self.config.progress_callback.clone();

        warn_on_collisions(&processor, &jobs);

        let workers = self.config.workers.max(1).min(total.max(1));
        info!(
            "Processing {} file(s) with {} worker(s) → {}",
            total,
            workers,
            output_dir.display()
        );
        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }

        // ── Queue ────────────────────────────────────────────────────────
        let (job_tx, job_rx) = mpsc::channel::<Job>(total.max(1));
        for job in jobs {
            job_tx
                .try_send(job)
                .map_err(|e| HandwriteError::Internal(format!("job queue rejected a job: {e}")))?;
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::channel::<JobOutcome>(total.max(1));

        // ── Workers ──────────────────────────────────────────────────────
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let processor = Arc::clone(&processor);
                let callback = callback.clone();
                tokio::spawn(async move {
                    let mut handled = 0usize;
                    loop {
                        // Lock only for the pop, never across processing.
                        let next = job_rx.lock().await.recv().await;
                        let Some(job) = next else { break };

                        if let Some(ref cb) = callback {
                            cb.on_job_start(&job.path);
                        }
                        let outcome = processor.process(job).await;
                        if let Some(ref cb) = callback {
                            cb.on_job_complete(&outcome);
                        }
                        handled += 1;
                        if result_tx.send(outcome).await.is_err() {
                            break;
                        }
                    }
                    debug!("Worker {} finished after {} job(s)", id, handled);
                })
            })
            .collect();
        drop(result_tx);

        let mut panicked = 0usize;
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker terminated abnormally: {}", e);
                panicked += 1;
            }
        }

        // ── Aggregate ────────────────────────────────────────────────────
        let summary = Aggregator::drain(result_rx).await;

        if panicked > 0 {
            return Err(HandwriteError::Internal(format!(
                "{panicked} worker(s) panicked; {} of {total} job(s) reported an outcome",
                summary.total()
            )));
        }

        info!(
            "Batch complete: {} successful, {} failed in {:?}",
            summary.successful,
            summary.failed,
            start.elapsed()
        );
        if let Some(ref cb) = callback {
            cb.on_batch_complete(&summary);
        }
        Ok(summary)
    }
}

/// Log when two jobs would write the same note; the later one overwrites.
fn warn_on_collisions(processor: &FileProcessor, jobs: &[Job]) {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    for job in jobs {
        let target = processor.output_path_for(&job.path);
        if let Some(previous) = seen.get(&target) {
            warn!(
                "{} and {} both map to {}; one note will overwrite the other",
                previous.display(),
                job.path.display(),
                target.display()
            );
        } else {
            seen.insert(target, &job.path);
        }
    }
}

// ── Aggregator ───────────────────────────────────────────────────────────

/// Folds job outcomes into a [`BatchSummary`].
#[derive(Debug, Default)]
pub struct Aggregator {
    summary: BatchSummary,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &JobOutcome) {
        self.summary.record(outcome.is_success());
    }

    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    /// Consume outcomes until every sender has been dropped.
    pub async fn drain(mut results: mpsc::Receiver<JobOutcome>) -> BatchSummary {
        let mut aggregator = Self::new();
        while let Some(outcome) = results.recv().await {
            aggregator.record(&outcome);
        }
        aggregator.summary()
    }
}

// ── Convenience entry point ──────────────────────────────────────────────

/// Ensure `path` is a usable output directory, creating it if missing.
pub fn prepare_output_dir(path: &Path) -> Result<(), HandwriteError> {
    if path.exists() && !path.is_dir() {
        return Err(HandwriteError::OutputDirInvalid {
            path: path.to_path_buf(),
            reason: "exists and is not a directory".into(),
        });
    }
    std::fs::create_dir_all(path).map_err(|e| HandwriteError::OutputDirInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Discover the files under `input`, then run them as one batch.
///
/// Finding no supported file is fatal ([`HandwriteError::NoInputFiles`]), as
/// is an unusable output directory. Both are checked before any job runs.
pub async fn process_path(
    input: &Path,
    output_dir: &Path,
    config: ProcessConfig,
    inference: Arc<dyn InferencePort>,
) -> Result<BatchSummary, HandwriteError> {
    let files = discover::list_supported_files(input)?;
    if files.is_empty() {
        return Err(HandwriteError::NoInputFiles {
            path: input.to_path_buf(),
        });
    }
    prepare_output_dir(output_dir)?;

    let jobs = files.into_iter().map(Job::from).collect();
    BatchProcessor::new(config, inference)
        .run(jobs, output_dir)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;

    #[tokio::test]
    async fn aggregator_counts_outcomes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(JobOutcome::success(Job::new("a.png"), PathBuf::from("a.md")))
            .await
            .unwrap();
        tx.send(JobOutcome::failure(
            Job::new("b.png"),
            JobError::Timeout { secs: 1 },
        ))
        .await
        .unwrap();
        tx.send(JobOutcome::success(Job::new("c.png"), PathBuf::from("c.md")))
            .await
            .unwrap();
        drop(tx);

        let summary = Aggregator::drain(rx).await;
        assert_eq!(summary, BatchSummary { successful: 2, failed: 1 });
        assert!(!summary.is_success());
    }

    #[test]
    fn output_dir_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            prepare_output_dir(&file),
            Err(HandwriteError::OutputDirInvalid { .. })
        ));

        let nested = dir.path().join("a").join("b");
        prepare_output_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
