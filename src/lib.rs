//! # handwrite
//!
//! Batch-convert scanned handwritten notes (PDF, PNG, JPEG) into Markdown
//! notes using Vision Language Models.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input path
//!  │
//!  ├─ 1. Discover  walk the directory for pdf / png / jpg / jpeg
//!  ├─ 2. Schedule  W workers pop jobs from a shared queue
//!  ├─ 3. Load      PDF sent whole, image decoded to one frame
//!  ├─ 4. Extract   VLM call per unit, fixed retry budget, 5 min job deadline
//!  ├─ 5. Render    Go-style note template, atomic write to <stem>.md
//!  └─ 6. Summary   successful / failed counts
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use handwrite::{create_provider, process_path, LlmInference, ProcessConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY
//!     let config = ProcessConfig::builder()
//!         .template_path("templates/note_template.md")
//!         .workers(4)
//!         .build()?;
//!     let provider = create_provider("gemini", &config.model)?;
//!     let inference = Arc::new(LlmInference::new(provider, &config));
//!
//!     let summary = process_path(Path::new("scans/"), Path::new("notes/"), config, inference).await?;
//!     eprintln!("{} ok, {} failed", summary.successful, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `handwrite` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! handwrite = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{prepare_output_dir, process_path, Aggregator, BatchProcessor};
pub use config::{LoadedSettings, ProcessConfig, ProcessConfigBuilder, Settings};
pub use error::{HandwriteError, InferenceError, JobError, TemplateError};
pub use output::{BatchSummary, ExtractionResult, Job, JobOutcome, PageUnit, RenderRecord};
pub use pipeline::discover::list_supported_files;
pub use pipeline::llm::{check_credential, create_provider, InferencePort, LlmInference};
pub use pipeline::retry::call_with_retry;
pub use process::FileProcessor;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
