//! Post-processing: deterministic cleanup of model output.
//!
//! Two entry points:
//!
//! * [`unwrap_response`] — runs on the raw response body before JSON parsing:
//!   fixes line endings, drops invisible Unicode and removes an outer code
//!   fence (```` ```json ````, ```` ```markdown ```` or bare ```` ``` ````).
//! * [`clean_transcription`] — runs on the transcribed Markdown of one unit:
//!   trims trailing whitespace per line and collapses runs of blank lines.
//!
//! No rule touches the transcribed words themselves.

use once_cell::sync::Lazy;
use regex::Regex;

/// Normalise a raw response and strip an outer code fence if present.
pub fn unwrap_response(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    strip_outer_fence(&s)
}

/// Tidy the Markdown of one page unit.
pub fn clean_transcription(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Outer fences ─────────────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^```json[ \t]*\n").unwrap());

/// True if the raw response opens with a ```` ```json ```` fence.
pub fn is_json_fenced(raw: &str) -> bool {
    RE_JSON_FENCE.is_match(raw.trim_start())
}

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Line endings ─────────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Invisible Unicode ────────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Whitespace ───────────────────────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}
