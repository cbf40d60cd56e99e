//! Inference port: the boundary between the batch core and the OCR model.
//!
//! [`InferencePort`] is all the per-file pipeline knows about OCR. The
//! production implementation, [`LlmInference`], drives any vision-capable
//! `edgequake_llm` provider; tests substitute a scripted stub.
//!
//! ## Response shapes
//!
//! Models answer either with plain Markdown or, when asked for structured
//! output, with `{"content": "...", "tags": [...]}`, often wrapped in a
//! code fence. [`parse_response`] maps both onto [`ExtractionResult`].

use crate::config::ProcessConfig;
use crate::error::{HandwriteError, InferenceError};
use crate::output::ExtractionResult;
use crate::pipeline::{encode, postprocess};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::DynamicImage;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Abstract OCR/extraction service.
///
/// Calls are safe to repeat with the same input, but model output may differ
/// between attempts. Implementations are shared across workers and must
/// tolerate concurrent calls.
#[async_trait]
pub trait InferencePort: Send + Sync {
    /// Extract text from a single decoded image.
    async fn extract_from_image(
        &self,
        image: &DynamicImage,
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError>;

    /// Extract text from a whole multi-page document in one call.
    async fn extract_from_document(
        &self,
        bytes: &[u8],
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError>;

    /// Model identifier recorded in each rendered note.
    fn model(&self) -> &str;
}

/// [`InferencePort`] backed by an `edgequake_llm` vision provider.
pub struct LlmInference {
    provider: Arc<dyn LLMProvider>,
    model: String,
    options: CompletionOptions,
    structured_output: bool,
}

impl LlmInference {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            options: build_options(config),
            structured_output: config.structured_output,
        }
    }

    async fn complete(
        &self,
        attachment: ImageData,
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(prompt),
            ChatMessage::user_with_images("", vec![attachment]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        debug!(
            "{}: {} chars in {:?}",
            self.model,
            response.content.len(),
            start.elapsed()
        );
        parse_response(&response.content, self.structured_output)
    }
}

#[async_trait]
impl InferencePort for LlmInference {
    async fn extract_from_image(
        &self,
        image: &DynamicImage,
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError> {
        let attachment =
            encode::encode_image(image).map_err(|e| InferenceError::Encode(e.to_string()))?;
        self.complete(attachment, prompt).await
    }

    async fn extract_from_document(
        &self,
        bytes: &[u8],
        prompt: &str,
    ) -> Result<ExtractionResult, InferenceError> {
        self.complete(encode::encode_document(bytes), prompt).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Environment variable holding the API key for a provider, if it needs one.
pub fn credential_env_var(provider: &str) -> Option<&'static str> {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Some("GEMINI_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "mistral" => Some("MISTRAL_API_KEY"),
        "openrouter" => Some("OPENROUTER_API_KEY"),
        "azure" => Some("AZURE_OPENAI_API_KEY"),
        _ => None,
    }
}

/// Fail fast when the provider's API key is missing or empty.
pub fn check_credential(provider: &str) -> Result<(), HandwriteError> {
    let Some(var) = credential_env_var(provider) else {
        return Ok(());
    };
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(HandwriteError::MissingCredential {
            var: var.to_string(),
        }),
    }
}

/// Instantiate a named vision provider with the configured model.
///
/// Checks the provider's credential first so a missing key is reported as
/// [`HandwriteError::MissingCredential`] before anything is scheduled.
pub fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, HandwriteError> {
    check_credential(provider_name)?;
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        HandwriteError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Build `CompletionOptions` from the process config.
fn build_options(config: &ProcessConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[derive(Debug, Deserialize)]
struct StructuredResponse {
    content: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Map a raw model response onto an [`ExtractionResult`].
///
/// An empty body is [`InferenceError::EmptyResponse`]. Without
/// `structured_output` the body is always plain Markdown. With it, a body
/// starting with `{` is parsed as `{content, tags?}`; when that fails the
/// body is kept as plain Markdown unless the model fenced it as ```` ```json ````,
/// which is [`InferenceError::MalformedResponse`].
pub fn parse_response(
    raw: &str,
    structured_output: bool,
) -> Result<ExtractionResult, InferenceError> {
    let body = postprocess::unwrap_response(raw);
    if body.is_empty() {
        return Err(InferenceError::EmptyResponse);
    }

    if !structured_output || !body.starts_with('{') {
        return Ok(ExtractionResult::Plain {
            text: postprocess::clean_transcription(&body),
        });
    }

    let parsed: StructuredResponse = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) if postprocess::is_json_fenced(raw) => {
            return Err(InferenceError::MalformedResponse(e.to_string()))
        }
        Err(e) => {
            debug!("Response is not structured JSON ({e}), keeping it as Markdown");
            return Ok(ExtractionResult::Plain {
                text: postprocess::clean_transcription(&body),
            });
        }
    };
    let text = postprocess::clean_transcription(&parsed.content);
    debug!(
        "Parsed structured response: {} chars, {} tags",
        text.len(),
        parsed.tags.as_ref().map_or(0, Vec::len)
    );

    Ok(match parsed.tags {
        Some(tags) => ExtractionResult::Tagged { text, tags },
        None => ExtractionResult::Plain { text },
    })
}
