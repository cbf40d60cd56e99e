//! Data model shared by the pipeline, the scheduler and callers.
//!
//! Ownership follows the flow of a batch: a [`Job`] is created at discovery
//! time and moved into exactly one worker; the worker produces exactly one
//! [`JobOutcome`]; the aggregator folds outcomes into a [`BatchSummary`].

use crate::error::JobError;
use image::DynamicImage;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// One input file queued for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub path: PathBuf,
}

impl Job {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl From<PathBuf> for Job {
    fn from(path: PathBuf) -> Self {
        Self { path }
    }
}

/// One inference-call-sized chunk of a job.
#[derive(Debug)]
pub enum PageUnit {
    /// A whole multi-page document sent as a single call.
    Document { bytes: Vec<u8> },
    /// One decoded raster frame (1-indexed page number).
    Image { image: DynamicImage, page_num: usize },
}

impl PageUnit {
    pub fn page_num(&self) -> usize {
        match self {
            PageUnit::Document { .. } => 1,
            PageUnit::Image { page_num, .. } => *page_num,
        }
    }
}

/// Text returned by one inference call.
///
/// The model either answered with plain Markdown or with the structured
/// `{"content": ..., "tags": [...]}` shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionResult {
    Plain { text: String },
    Tagged { text: String, tags: Vec<String> },
}

impl ExtractionResult {
    pub fn text(&self) -> &str {
        match self {
            ExtractionResult::Plain { text } | ExtractionResult::Tagged { text, .. } => text,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            ExtractionResult::Plain { .. } => &[],
            ExtractionResult::Tagged { tags, .. } => tags,
        }
    }
}

/// Deduplicate tags by value, keeping the first occurrence of each.
pub fn dedup_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.as_ref();
        if seen.insert(tag.to_string()) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Fields available to the note template.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRecord {
    pub content: String,
    pub filename: String,
    pub source_path_absolute: PathBuf,
    /// Source path relative to the output directory, for note-to-source links.
    pub source_path_relative: PathBuf,
    pub output_dir: PathBuf,
    pub page_count: usize,
    pub model_used: String,
    pub custom_variables: BTreeMap<String, serde_json::Value>,
    /// RFC 3339 timestamp taken when the record was built.
    pub datetime_processed: String,
    pub tags: Option<Vec<String>>,
}

/// Result of processing one job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub result: Result<PathBuf, JobError>,
}

impl JobOutcome {
    pub fn success(job: Job, output_path: PathBuf) -> Self {
        Self {
            job,
            result: Ok(output_path),
        }
    }

    pub fn failure(job: Job, error: JobError) -> Self {
        Self {
            job,
            result: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn error(&self) -> Option<&JobError> {
        self.result.as_ref().err()
    }
}

/// Aggregate success/failure tally for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub successful: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, success: bool) {
        if success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed
    }

    /// The batch succeeds only if no job failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_seen_order() {
        let merged = dedup_tags(["a", "b", "b", "c"]);
        assert_eq!(merged, vec!["a", "b", "c"]);
    }

    #[test]
    fn dedup_across_units() {
        let units = [vec!["a", "b"], vec!["b", "c"]];
        let merged = dedup_tags(units.iter().flatten());
        assert_eq!(merged, vec!["a", "b", "c"]);
    }

    #[test]
    fn plain_result_has_no_tags() {
        let r = ExtractionResult::Plain {
            text: "hello".into(),
        };
        assert_eq!(r.text(), "hello");
        assert!(r.tags().is_empty());
    }

    #[test]
    fn summary_counts() {
        let mut s = BatchSummary::default();
        s.record(true);
        s.record(false);
        s.record(true);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.total(), 3);
        assert!(!s.is_success());
        assert!(BatchSummary::default().is_success());
    }
}
