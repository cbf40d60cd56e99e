//! Configuration types for batch handwriting conversion.
//!
//! Two layers:
//!
//! * [`Settings`] — the on-disk TOML file (`~/.config/handwrite/config.toml`).
//!   Every section and key is optional; missing keys fall back to the
//!   documented defaults.
//! * [`ProcessConfig`] — the runtime configuration handed to
//!   [`crate::FileProcessor`] and [`crate::BatchProcessor`], built via
//!   [`ProcessConfigBuilder`]. No process-wide state: each batch owns its
//!   config.

use crate::error::HandwriteError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_PROMPT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default LLM provider name understood by `edgequake_llm::ProviderFactory`.
pub const DEFAULT_PROVIDER: &str = "gemini";
/// Default vision model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
/// Default template path, relative to the config directory.
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/note_template.md";

/// Runtime configuration for one batch.
///
/// # Example
/// ```rust
/// use handwrite::ProcessConfig;
///
/// let config = ProcessConfig::builder()
///     .workers(8)
///     .model("gemini-2.0-flash")
///     .template_path("templates/note_template.md")
///     .build()
///     .unwrap();
/// assert_eq!(config.workers, 8);
/// ```
#[derive(Clone)]
pub struct ProcessConfig {
    /// Model identifier recorded in each note. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Instruction sent with every page unit. Default: [`DEFAULT_PROMPT`].
    pub prompt: String,

    /// Ask the model for `{"content", "tags"}` JSON. Default: true.
    pub structured_output: bool,

    /// Template used to render each note.
    pub template_path: PathBuf,

    /// Free-form values exposed to the template as `.CustomVariables`.
    pub custom_variables: BTreeMap<String, serde_json::Value>,

    /// Only `"markdown"` is supported.
    pub output_format: String,

    /// Only UTF-8 is supported.
    pub output_encoding: String,

    /// Number of concurrent workers. Default: 4, minimum 1.
    pub workers: usize,

    /// Inference attempts per page unit. Default: 3.
    pub max_attempts: u32,

    /// Deadline per job, covering all attempts. Default: 300.
    pub job_timeout_secs: u64,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum output tokens per call. Default: 8192.
    pub max_tokens: usize,

    /// Progress events; `None` disables them.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            structured_output: true,
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            custom_variables: BTreeMap::new(),
            output_format: "markdown".to_string(),
            output_encoding: "utf-8".to_string(),
            workers: 4,
            max_attempts: 3,
            job_timeout_secs: 300,
            temperature: 0.1,
            max_tokens: 8192,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessConfig")
            .field("model", &self.model)
            .field("structured_output", &self.structured_output)
            .field("template_path", &self.template_path)
            .field("custom_variables", &self.custom_variables)
            .field("output_format", &self.output_format)
            .field("output_encoding", &self.output_encoding)
            .field("workers", &self.workers)
            .field("max_attempts", &self.max_attempts)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessConfig {
    /// Create a new builder for `ProcessConfig`.
    pub fn builder() -> ProcessConfigBuilder {
        ProcessConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessConfig`].
#[derive(Debug)]
pub struct ProcessConfigBuilder {
    config: ProcessConfig,
}

impl ProcessConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn structured_output(mut self, v: bool) -> Self {
        self.config.structured_output = v;
        self
    }

    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn custom_variables(mut self, vars: BTreeMap<String, serde_json::Value>) -> Self {
        self.config.custom_variables = vars;
        self
    }

    pub fn custom_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.custom_variables.insert(key.into(), value);
        self
    }

    pub fn output_format(mut self, format: impl Into<String>) -> Self {
        self.config.output_format = format.into();
        self
    }

    pub fn output_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.config.output_encoding = encoding.into();
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessConfig, HandwriteError> {
        let c = &self.config;
        if c.workers == 0 {
            return Err(HandwriteError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.max_attempts == 0 {
            return Err(HandwriteError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.job_timeout_secs == 0 {
            return Err(HandwriteError::InvalidConfig(
                "job_timeout_secs must be ≥ 1".into(),
            ));
        }
        if !c.output_format.eq_ignore_ascii_case("markdown") {
            return Err(HandwriteError::InvalidConfig(format!(
                "Unsupported output format '{}' (only 'markdown')",
                c.output_format
            )));
        }
        if !is_utf8_label(&c.output_encoding) {
            return Err(HandwriteError::InvalidConfig(format!(
                "Unsupported output encoding '{}' (only 'utf-8')",
                c.output_encoding
            )));
        }
        Ok(self.config)
    }
}

fn is_utf8_label(label: &str) -> bool {
    matches!(label.to_ascii_lowercase().as_str(), "utf-8" | "utf8")
}

// ── On-disk settings ─────────────────────────────────────────────────────

/// Contents of the TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub inference: InferenceSettings,
    pub template: TemplateSettings,
    pub output: OutputSettings,
    pub processing: ProcessingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub structured_output: bool,
    pub max_attempts: u32,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            structured_output: true,
            max_attempts: 3,
            temperature: 0.1,
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSettings {
    pub path: PathBuf,
    pub variables: BTreeMap<String, serde_json::Value>,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            variables: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: String,
    pub encoding: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: "markdown".to_string(),
            encoding: "utf-8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    pub workers: usize,
    pub job_timeout_secs: u64,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            job_timeout_secs: 300,
        }
    }
}

/// Settings together with the file they came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub source: Option<PathBuf>,
}

/// `~/.config/handwrite/config.toml`, or `None` without a home directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("handwrite").join("config.toml"))
}

/// Load `KEY=value` pairs from a `.env` file into the process environment.
///
/// Variables that are already set keep their value. An `explicit` file must
/// exist; otherwise `.env` is looked up from the working directory upwards
/// and its absence is not an error. Returns the file that was loaded.
pub fn load_env_file(explicit: Option<&Path>) -> Result<Option<PathBuf>, HandwriteError> {
    let env_err = |path: &Path, e: dotenvy::Error| HandwriteError::ConfigParse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };
    match explicit {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| env_err(path, e))?;
            debug!("Loaded environment from {}", path.display());
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => {
                debug!("Loaded environment from {}", path.display());
                Ok(Some(path))
            }
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(env_err(Path::new(".env"), e)),
        },
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, HandwriteError> {
        toml::from_str(text).map_err(|e| HandwriteError::ConfigParse {
            path: origin.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, HandwriteError> {
        let text = std::fs::read_to_string(path).map_err(|e| HandwriteError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Resolve settings: explicit path (must exist), then the default
    /// location, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedSettings, HandwriteError> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path.display());
            return Ok(LoadedSettings {
                settings: Self::from_file(path)?,
                source: Some(path.to_path_buf()),
            });
        }
        match default_config_path() {
            Some(path) if path.is_file() => {
                info!("Loading config from {}", path.display());
                Ok(LoadedSettings {
                    settings: Self::from_file(&path)?,
                    source: Some(path),
                })
            }
            _ => {
                debug!("No config file found, using defaults");
                Ok(LoadedSettings {
                    settings: Self::default(),
                    source: None,
                })
            }
        }
    }

    /// Serialise the defaults to `path`. Fails if the file already exists.
    pub fn write_default(path: &Path) -> Result<(), HandwriteError> {
        if path.exists() {
            return Err(HandwriteError::ConfigExists {
                path: path.to_path_buf(),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HandwriteError::ConfigRead {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let text = toml::to_string_pretty(&Self::default())
            .map_err(|e| HandwriteError::Internal(format!("serialise default config: {e}")))?;
        std::fs::write(path, text).map_err(|e| HandwriteError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl LoadedSettings {
    /// Template path with relative paths anchored at the config file's
    /// directory (or left relative to the working directory).
    pub fn resolved_template_path(&self) -> PathBuf {
        let path = &self.settings.template.path;
        if path.is_absolute() {
            return path.clone();
        }
        match self.source.as_deref().and_then(Path::parent) {
            Some(dir) => dir.join(path),
            None => path.clone(),
        }
    }

    /// Start a [`ProcessConfigBuilder`] pre-filled from these settings.
    pub fn to_builder(&self) -> ProcessConfigBuilder {
        let s = &self.settings;
        ProcessConfig::builder()
            .model(s.inference.model.clone())
            .prompt(s.inference.prompt.clone())
            .structured_output(s.inference.structured_output)
            .max_attempts(s.inference.max_attempts)
            .temperature(s.inference.temperature)
            .max_tokens(s.inference.max_tokens)
            .template_path(self.resolved_template_path())
            .custom_variables(s.template.variables.clone())
            .output_format(s.output.format.clone())
            .output_encoding(s.output.encoding.clone())
            .workers(s.processing.workers)
            .job_timeout_secs(s.processing.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ProcessConfig::default();
        assert_eq!(c.workers, 4);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.job_timeout_secs, 300);
        assert_eq!(c.output_format, "markdown");
        assert_eq!(c.output_encoding, "utf-8");
    }

    #[test]
    fn builder_rejects_zero_workers_and_attempts() {
        let err = ProcessConfig::builder().workers(0).build().unwrap_err();
        assert!(matches!(err, HandwriteError::InvalidConfig(_)));
        assert!(err.to_string().contains("Workers"));

        let err = ProcessConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));

        assert_eq!(ProcessConfig::builder().workers(1).build().unwrap().workers, 1);
    }

    #[test]
    fn zero_workers_in_config_file_is_rejected() {
        let text = "[processing]\nworkers = 0\n";
        let loaded = LoadedSettings {
            settings: Settings::from_toml_str(text, Path::new("config.toml")).unwrap(),
            source: None,
        };
        assert!(matches!(
            loaded.to_builder().build(),
            Err(HandwriteError::InvalidConfig(_))
        ));
    }

    #[test]
    fn builder_rejects_other_encodings() {
        let err = ProcessConfig::builder()
            .output_encoding("latin-1")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("latin-1"));
    }

    #[test]
    fn builder_rejects_other_formats() {
        assert!(ProcessConfig::builder().output_format("html").build().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let text = r#"
            [inference]
            model = "gemini-2.5-pro"

            [template.variables]
            author = "Ada"
            year = 2024
        "#;
        let s = Settings::from_toml_str(text, Path::new("config.toml")).unwrap();
        assert_eq!(s.inference.model, "gemini-2.5-pro");
        assert_eq!(s.inference.provider, DEFAULT_PROVIDER);
        assert_eq!(s.inference.max_attempts, 3);
        assert_eq!(s.output.encoding, "utf-8");
        assert_eq!(s.template.variables["author"], serde_json::json!("Ada"));
        assert_eq!(s.template.variables["year"], serde_json::json!(2024));
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = Settings::from_toml_str("[inference\nmodel=", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, HandwriteError::ConfigParse { .. }));
    }

    #[test]
    fn write_default_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Settings::write_default(&path).unwrap();
        let reloaded = Settings::from_file(&path).unwrap();
        assert_eq!(reloaded, Settings::default());

        let err = Settings::write_default(&path).unwrap_err();
        assert!(matches!(err, HandwriteError::ConfigExists { .. }));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, HandwriteError::ConfigRead { .. }));
    }

    #[test]
    fn env_file_supplies_missing_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "HANDWRITE_TEST_DOTENV_KEY=from-file\nHANDWRITE_TEST_DOTENV_SET=from-file\n",
        )
        .unwrap();
        std::env::set_var("HANDWRITE_TEST_DOTENV_SET", "from-shell");

        assert_eq!(load_env_file(Some(&path)).unwrap(), Some(path.clone()));
        assert_eq!(std::env::var("HANDWRITE_TEST_DOTENV_KEY").unwrap(), "from-file");
        assert_eq!(std::env::var("HANDWRITE_TEST_DOTENV_SET").unwrap(), "from-shell");
    }

    #[test]
    fn explicit_missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(Some(&dir.path().join("missing.env"))).is_err());
    }

    #[test]
    fn relative_template_resolves_against_config_dir() {
        let loaded = LoadedSettings {
            settings: Settings::default(),
            source: Some(PathBuf::from("/etc/handwrite/config.toml")),
        };
        assert_eq!(
            loaded.resolved_template_path(),
            PathBuf::from("/etc/handwrite/templates/note_template.md")
        );

        let defaults = LoadedSettings {
            settings: Settings::default(),
            source: None,
        };
        assert_eq!(
            defaults.resolved_template_path(),
            PathBuf::from(DEFAULT_TEMPLATE_PATH)
        );
    }

    #[test]
    fn settings_feed_builder() {
        let mut settings = Settings::default();
        settings.processing.workers = 7;
        settings.inference.max_attempts = 5;
        let loaded = LoadedSettings {
            settings,
            source: None,
        };
        let c = loaded.to_builder().build().unwrap();
        assert_eq!(c.workers, 7);
        assert_eq!(c.max_attempts, 5);
    }
}
