//! Pipeline stages for handwriting-to-Markdown conversion.
//!
//! Each submodule implements one step of turning a file into a note.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ input ──▶ encode ──▶ llm ──▶ postprocess ──▶ render
//!  (walk)     (units)   (base64)   (VLM)    (cleanup)       (template)
//!                                    ▲
//!                                  retry
//! ```
//!
//! 1. [`discover`] — expand the user path into supported files
//! 2. [`input`]    — classify a file and load its page units; image decoding
//!    runs in `spawn_blocking`
//! 3. [`encode`]   — wrap a frame (PNG) or a whole PDF as base64 `ImageData`
//! 4. [`llm`]      — the [`llm::InferencePort`] seam and its `edgequake_llm`
//!    implementation; the only stage with network I/O
//! 5. [`retry`]    — fixed attempt budget around each inference call
//! 6. [`postprocess`] — strip fences and tidy whitespace in model output
//! 7. [`render`]   — fill the note template and write it atomically

pub mod discover;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod retry;
