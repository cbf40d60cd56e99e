//! Attachment encoding: page units → base64 `ImageData` for the VLM request.
//!
//! Images are re-encoded as PNG: lossless, so pen strokes stay crisp.
//! Documents are passed through untouched with MIME `application/pdf`; the
//! provider reads every page itself, so nothing is rasterised locally.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// MIME type used for whole-document attachments.
pub const PDF_MIME: &str = "application/pdf";

/// Encode a decoded image as a base64 PNG attachment.
pub fn encode_image(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Wrap raw PDF bytes as a base64 attachment.
pub fn encode_document(bytes: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded document ({} bytes) → {} bytes base64", bytes.len(), b64.len());
    ImageData::new(b64, PDF_MIME)
}
