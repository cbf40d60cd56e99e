//! Error types for the handwrite library.
//!
//! Four error types reflect four distinct failure scopes:
//!
//! * [`HandwriteError`] — **Fatal**: the batch cannot start at all (missing
//!   credential, bad output directory, no input files). Returned before any
//!   job is dispatched.
//!
//! * [`JobError`] — **Per job**: one input file could not be turned into a
//!   Markdown note. Absorbed into [`crate::output::JobOutcome`]; it only
//!   influences the process exit code through the aggregate summary.
//!
//! * [`InferenceError`] — **Transient**: one call to the inference service
//!   failed. Retried by [`crate::pipeline::retry::call_with_retry`].
//!
//! * [`TemplateError`] — rendering the note failed. Never retried.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal setup errors returned by the handwrite library.
#[derive(Debug, Error)]
pub enum HandwriteError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input path does not exist.
    #[error("Input path not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Discovery found nothing to process.
    #[error("No supported files found in '{path}' (supported: pdf, png, jpg, jpeg)")]
    NoInputFiles { path: PathBuf },

    /// Walking the input directory failed part-way.
    #[error("Failed to scan '{path}': {detail}")]
    DiscoveryFailed { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output path exists but is not a directory, or cannot be created.
    #[error("Output directory '{path}' is not usable: {reason}")]
    OutputDirInvalid { path: PathBuf, reason: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// The API key for the configured provider is not set.
    #[error("{var} not found in environment variables.\nExport it, e.g.: export {var}=...")]
    MissingCredential { var: String },

    /// The configured provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The config file exists but could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Failed to parse config file '{path}': {detail}")]
    ConfigParse { path: PathBuf, detail: String },

    /// `config setup` refuses to overwrite an existing file.
    #[error("Config file already exists at '{path}'")]
    ConfigExists { path: PathBuf },

    /// Builder or settings validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single job.
#[derive(Debug, Error)]
pub enum JobError {
    /// The file extension is not one the pipeline knows how to process.
    #[error("Unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, extension: String },

    /// The input file could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The image file could not be decoded.
    #[error("Failed to decode image '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    /// Every page unit of the job failed inference.
    #[error("All {units} page unit(s) failed: {first_error}")]
    AllUnitsFailed { units: usize, first_error: String },

    /// Inference succeeded but produced nothing worth writing.
    #[error("No text extracted from '{path}'")]
    EmptyText { path: PathBuf },

    /// The note could not be rendered or written.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The job's deadline elapsed before it finished.
    #[error("Job timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// A failure of one call to the inference service.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Network, HTTP or provider-side failure.
    #[error("Inference request failed: {0}")]
    Transport(String),

    /// The model returned no text at all.
    #[error("Empty response from model")]
    EmptyResponse,

    /// The model returned JSON that does not match `{content, tags}`.
    #[error("Malformed response from model: {0}")]
    MalformedResponse(String),

    /// The image could not be encoded for upload.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Every attempt failed; wraps the last failure.
    #[error("failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<InferenceError>,
    },
}

/// Template rendering failures.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template file not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("Failed to parse template '{path}': {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Failed to write output file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exhausted_states_attempt_count() {
        let e = InferenceError::RetriesExhausted {
            attempts: 3,
            source: Box::new(InferenceError::Transport("503".into())),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
    }

    #[test]
    fn missing_credential_names_variable() {
        let e = HandwriteError::MissingCredential {
            var: "GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().starts_with("GEMINI_API_KEY not found"));
    }

    #[test]
    fn template_error_converts_into_job_error() {
        let e: JobError = TemplateError::NotFound {
            path: PathBuf::from("/tmp/missing.md"),
        }
        .into();
        assert!(e.to_string().contains("Template file not found"));
    }

    #[test]
    fn unsupported_file_type_display() {
        let e = JobError::UnsupportedFileType {
            path: PathBuf::from("notes.txt"),
            extension: ".txt".into(),
        };
        assert!(e.to_string().contains("'.txt'"));
    }
}
