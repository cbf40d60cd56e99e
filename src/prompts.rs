//! Prompts sent to the vision model.
//!
//! Callers override the transcription prompt via
//! [`crate::config::ProcessConfig::prompt`]; the structured-output suffix is
//! appended here so the override never has to restate the JSON contract.

/// Default transcription prompt for handwritten notes.
pub const DEFAULT_PROMPT: &str = r#"Extract the handwritten text from this image.
- Use $ for LaTeX, not ```latex.
- Transcribe the text exactly as it appears.
- The output must be only the transcribed Markdown, with no additional commentary."#;

/// Appended when `structured_output` is enabled.
pub const STRUCTURED_OUTPUT_SUFFIX: &str = r#"

Respond with a single JSON object and nothing else:
{"content": "<the transcribed Markdown>", "tags": ["<short topic tag>", ...]}
Use lowercase, hyphenated tags. Use an empty list if no topic is clear."#;

/// Build the full instruction for one inference call.
pub fn build_prompt(prompt: &str, structured_output: bool) -> String {
    if structured_output {
        format!("{prompt}{STRUCTURED_OUTPUT_SUFFIX}")
    } else {
        prompt.to_string()
    }
}
