// Image intake helpers
//
// Pages arrive encoded. Engines decode them themselves, so the only thing
// done here is reading the header for dimensions and rejecting uploads that
// are not images at all.

use image::{ImageError, ImageReader};
use std::io::Cursor;
use std::sync::Arc;

use crate::core::types::PageImage;

/// Wrap encoded image bytes after probing their dimensions
pub fn probe_page_image(bytes: Vec<u8>) -> Result<PageImage, ImageError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes.as_slice()))
        .with_guessed_format()?
        .into_dimensions()?;

    Ok(PageImage {
        bytes: Arc::new(bytes),
        width,
        height,
    })
}

/// Async variant that keeps header parsing off the runtime threads
pub async fn probe_page_image_async(bytes: Vec<u8>) -> Result<PageImage, crate::core::PipelineError> {
    tokio::task::spawn_blocking(move || probe_page_image(bytes))
        .await
        .map_err(|e| crate::core::PipelineError::TaskJoinFailed(e.to_string()))?
        .map_err(Into::into)
}
