//! Input loading: classify a job's file and turn it into page units.
//!
//! Two classes exist. A document (PDF) is read once and sent whole; the
//! provider handles its pages natively. An image (PNG/JPEG) is decoded to a
//! single raster frame. Discovery already filters extensions, but a job
//! reaching this stage directly with an unknown extension is still rejected
//! with [`JobError::UnsupportedFileType`].

use crate::error::JobError;
use crate::output::PageUnit;
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a file is sent to the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    /// One inference unit covering every page.
    Document,
    /// Exactly one decoded raster frame.
    Image,
}

/// Lowercased extension with a leading dot, or `""` when there is none.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Classify `path` by extension, ignoring case.
pub fn classify(path: &Path) -> Result<FileClass, JobError> {
    match dotted_extension(path).as_str() {
        ".pdf" => Ok(FileClass::Document),
        ".png" | ".jpg" | ".jpeg" => Ok(FileClass::Image),
        other => Err(JobError::UnsupportedFileType {
            path: path.to_path_buf(),
            extension: other.to_string(),
        }),
    }
}

/// Load the page units for a file of the given class, in page order.
pub async fn load_units(path: &Path, class: FileClass) -> Result<Vec<PageUnit>, JobError> {
    match class {
        FileClass::Document => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| JobError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            debug!("Read document {} ({} bytes)", path.display(), bytes.len());
            Ok(vec![PageUnit::Document { bytes }])
        }
        FileClass::Image => {
            let image = decode_image(path.to_path_buf()).await?;
            debug!(
                "Decoded image {} → {}x{} px",
                path.display(),
                image.width(),
                image.height()
            );
            Ok(vec![PageUnit::Image { image, page_num: 1 }])
        }
    }
}

/// Decode an image on the blocking pool; decoding is CPU-bound.
async fn decode_image(path: PathBuf) -> Result<image::DynamicImage, JobError> {
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || image::open(&task_path))
        .await
        .map_err(|e| JobError::DecodeFailed {
            path: path.clone(),
            detail: format!("decode task panicked: {e}"),
        })?
        .map_err(|e| match e {
            image::ImageError::IoError(source) => JobError::ReadFailed {
                path: path.clone(),
                source,
            },
            other => JobError::DecodeFailed {
                path: path.clone(),
                detail: other.to_string(),
            },
        })
}
