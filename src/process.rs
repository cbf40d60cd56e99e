//! Per-file pipeline: one input path in, zero or one Markdown note out.
//!
//! ```text
//! classify ─▶ load units ─▶ extract (retry) ─▶ merge ─▶ render ─▶ note.md
//! ```
//!
//! A unit whose inference exhausts its retries leaves an inline marker in
//! the note instead of aborting the job. The job fails only when every unit
//! failed, the merged text is empty, rendering failed or the deadline
//! expired. Failures are logged here and returned inside the
//! [`JobOutcome`]; nothing is propagated to the scheduler.

use crate::config::ProcessConfig;
use crate::error::{InferenceError, JobError};
use crate::output::{dedup_tags, ExtractionResult, Job, JobOutcome, PageUnit, RenderRecord};
use crate::pipeline::llm::InferencePort;
use crate::pipeline::{input, render, retry};
use crate::prompts::build_prompt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs the per-file pipeline for jobs of one batch.
///
/// Cheap to share: config and inference handle are behind `Arc`s and never
/// mutated, so one processor serves every worker.
pub struct FileProcessor {
    config: Arc<ProcessConfig>,
    inference: Arc<dyn InferencePort>,
    output_dir: PathBuf,
}

/// Merged text and tags of all units of one job.
#[derive(Debug)]
struct Transcript {
    text: String,
    tags: Vec<String>,
    page_count: usize,
}

impl FileProcessor {
    pub fn new(
        config: Arc<ProcessConfig>,
        inference: Arc<dyn InferencePort>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            inference,
            output_dir: output_dir.into(),
        }
    }

    /// `<output_dir>/<file stem>.md`.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "note".to_string());
        self.output_dir.join(format!("{stem}.md"))
    }

    /// Process one job under the configured deadline.
    pub async fn process(&self, job: Job) -> JobOutcome {
        let start = Instant::now();
        let secs = self.config.job_timeout_secs;

        let result = match tokio::time::timeout(Duration::from_secs(secs), self.run(&job.path)).await
        {
            Ok(r) => r,
            Err(_) => Err(JobError::Timeout { secs }),
        };

        match result {
            Ok(output_path) => {
                info!(
                    "Processed {} → {} in {:?}",
                    job.path.display(),
                    output_path.display(),
                    start.elapsed()
                );
                JobOutcome::success(job, output_path)
            }
            Err(e) => {
                error!("Failed to process {}: {}", job.path.display(), e);
                JobOutcome::failure(job, e)
            }
        }
    }

    async fn run(&self, path: &Path) -> Result<PathBuf, JobError> {
        let class = input::classify(path)?;
        let units = input::load_units(path, class).await?;
        let transcript = self.transcribe(path, &units).await?;

        let output_path = self.output_path_for(path);
        let record = self.build_record(path, transcript);
        render::render_template(&self.config.template_path, &output_path, &record)?;
        Ok(output_path)
    }

    // ── Extraction ───────────────────────────────────────────────────────

    async fn transcribe(&self, path: &Path, units: &[PageUnit]) -> Result<Transcript, JobError> {
        let prompt = build_prompt(&self.config.prompt, self.config.structured_output);
        let mut parts = Vec::with_capacity(units.len());
        let mut tags = Vec::new();
        let mut first_error: Option<String> = None;
        let mut failed = 0;

        // Strictly sequential: units are concatenated in page order.
        for unit in units {
            let page = unit.page_num();
            match retry::call_with_retry(self.config.max_attempts, || self.extract(unit, &prompt))
                .await
            {
                Ok(result) => {
                    debug!(
                        "{} page {}: {} chars, {} tags",
                        path.display(),
                        page,
                        result.text().len(),
                        result.tags().len()
                    );
                    if let ExtractionResult::Tagged { tags: t, .. } = &result {
                        tags.extend(t.iter().cloned());
                    }
                    parts.push(result.text().to_string());
                }
                Err(e) => {
                    warn!("{} page {}: {}", path.display(), page, e);
                    parts.push(format!("Error processing page {page}: {e}"));
                    first_error.get_or_insert_with(|| e.to_string());
                    failed += 1;
                }
            }
        }

        if !units.is_empty() && failed == units.len() {
            return Err(JobError::AllUnitsFailed {
                units: units.len(),
                first_error: first_error.unwrap_or_default(),
            });
        }

        let text = parts.join("\n\n");
        if text.trim().is_empty() {
            return Err(JobError::EmptyText {
                path: path.to_path_buf(),
            });
        }

        Ok(Transcript {
            text,
            tags: dedup_tags(tags),
            page_count: units.len().max(1),
        })
    }

    async fn extract(
        &self,
        unit: &PageUnit,
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError> {
        match unit {
            PageUnit::Document { bytes } => {
                self.inference.extract_from_document(bytes, prompt).await
            }
            PageUnit::Image { image, .. } => self.inference.extract_from_image(image, prompt).await,
        }
    }

    // ── Record ───────────────────────────────────────────────────────────

    fn build_record(&self, source: &Path, transcript: Transcript) -> RenderRecord {
        let source_abs = absolutize(source);
        let output_dir = absolutize(&self.output_dir);
        let source_rel = relative_to(&source_abs, &output_dir);

        RenderRecord {
            content: transcript.text,
            filename: source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_path_absolute: source_abs,
            source_path_relative: source_rel,
            output_dir,
            page_count: transcript.page_count,
            model_used: self.inference.model().to_string(),
            custom_variables: self.config.custom_variables.clone(),
            datetime_processed: chrono::Local::now().to_rfc3339(),
            tags: (!transcript.tags.is_empty()).then_some(transcript.tags),
        }
    }
}

/// Canonical path when it exists, otherwise joined onto the working directory.
fn absolutize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Path from directory `base` to `target`; both must be absolute.
///
/// Falls back to `target` when the two share no root (different drives).
fn relative_to(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return target.to_path_buf();
    }

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers every call with a fixed result and counts calls.
    struct FixedInference {
        answer: Result<ExtractionResult, InferenceError>,
        calls: AtomicU32,
    }

    impl FixedInference {
        fn new(answer: Result<ExtractionResult, InferenceError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl InferencePort for FixedInference {
        async fn extract_from_image(
            &self,
            _image: &DynamicImage,
            _prompt: &str,
        ) -> Result<ExtractionResult, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }

        async fn extract_from_document(
            &self,
            _bytes: &[u8],
            _prompt: &str,
        ) -> Result<ExtractionResult, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }

        fn model(&self) -> &str {
            "stub-model"
        }
    }

    fn setup(template: &str) -> (tempfile::TempDir, Arc<ProcessConfig>) {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template.md");
        std::fs::write(&template_path, template).unwrap();
        let config = ProcessConfig::builder()
            .template_path(template_path)
            .custom_variable("author", serde_json::json!("Ada"))
            .build()
            .unwrap();
        (dir, Arc::new(config))
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_to(Path::new("/notes/a/x.pdf"), Path::new("/notes/out")),
            PathBuf::from("../a/x.pdf")
        );
        assert_eq!(
            relative_to(Path::new("/notes/out/x.pdf"), Path::new("/notes/out")),
            PathBuf::from("x.pdf")
        );
        assert_eq!(
            relative_to(Path::new("/a/x.pdf"), Path::new("/b/c")),
            PathBuf::from("../../a/x.pdf")
        );
    }

    #[test]
    fn output_path_uses_file_stem() {
        let (_dir, config) = setup("");
        let fp = FileProcessor::new(
            config,
            FixedInference::new(Err(InferenceError::EmptyResponse)),
            "/out",
        );
        assert_eq!(fp.output_path_for(Path::new("/in/week1/note1.PDF")), PathBuf::from("/out/note1.md"));
    }

    #[tokio::test]
    async fn renders_all_record_fields() {
        let (dir, config) = setup(
            "{{.Filename}}|{{.PageCount}}|{{.ModelUsed}}|{{.CustomVariables.author}}|{{range .Tags}}#{{.}} {{end}}\n{{.Content}}",
        );
        let source = dir.path().join("note1.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let out = dir.path().join("out");

        let stub = FixedInference::new(Ok(ExtractionResult::Tagged {
            text: "Hello".into(),
            tags: vec!["a".into(), "a".into(), "b".into()],
        }));
        let fp = FileProcessor::new(config, stub.clone(), &out);
        let outcome = fp.process(Job::new(&source)).await;

        assert!(outcome.is_success(), "{:?}", outcome.error());
        let written = std::fs::read_to_string(out.join("note1.md")).unwrap();
        assert_eq!(written, "note1.pdf|1|stub-model|Ada|#a #b \nHello");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_unit_fails_job_and_writes_nothing() {
        let (dir, config) = setup("{{.Content}}");
        let source = dir.path().join("note.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let out = dir.path().join("out");

        let stub = FixedInference::new(Err(InferenceError::Transport("503".into())));
        let fp = FileProcessor::new(config, stub.clone(), &out);
        let outcome = fp.process(Job::new(&source)).await;

        match outcome.error() {
            Some(JobError::AllUnitsFailed { units: 1, first_error }) => {
                assert!(first_error.contains("3 attempts"), "{first_error}")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
        assert!(!out.join("note.md").exists());
    }

    #[tokio::test]
    async fn blank_text_is_empty_error() {
        let (dir, config) = setup("{{.Content}}");
        let source = dir.path().join("note.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();

        let stub = FixedInference::new(Ok(ExtractionResult::Plain { text: "  \n ".into() }));
        let fp = FileProcessor::new(config, stub, dir.path().join("out"));
        let outcome = fp.process(Job::new(&source)).await;
        assert!(matches!(outcome.error(), Some(JobError::EmptyText { .. })));
    }

    #[tokio::test]
    async fn unsupported_type_never_calls_inference() {
        let (dir, config) = setup("{{.Content}}");
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"hello").unwrap();

        let stub = FixedInference::new(Ok(ExtractionResult::Plain { text: "x".into() }));
        let fp = FileProcessor::new(config, stub.clone(), dir.path().join("out"));
        let outcome = fp.process(Job::new(&source)).await;

        assert!(matches!(
            outcome.error(),
            Some(JobError::UnsupportedFileType { .. })
        ));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }
}
