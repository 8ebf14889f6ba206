//! Image preparation: cap page size, then wrap as base64 `ImageData`.
//!
//! Rendered pages are already capped by the rasteriser, but uploaded photos
//! and scans routinely arrive at 4000+ px. Those are scaled down here so every
//! page costs roughly the same number of image tokens. `detail: "high"` keeps
//! the provider from collapsing the page to a single low-resolution tile,
//! which loses RFC/CURP digits.

use crate::document::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::{ImageError, ImageFormat};
use std::io::Cursor;
use tracing::{debug, warn};

/// Downscale a page whose longest edge exceeds `max_pixels`.
///
/// Pages already within bounds are returned untouched, bytes and MIME type
/// included. Resized pages are re-encoded as PNG. A recognisable raster
/// format this build cannot decode (GIF, WebP, TIFF, …) is sent as-is.
pub fn prepare_page(page: PageImage, max_pixels: u32) -> Result<PageImage, image::ImageError> {
    let img = match image::load_from_memory(&page.bytes) {
        Ok(img) => img,
        Err(ImageError::Unsupported(e)) if image::guess_format(&page.bytes).is_ok() => {
            warn!(
                "Page {}: cannot resize {} ({}); sending original bytes",
                page.page_num, page.mime_type, e
            );
            return Ok(page);
        }
        Err(e) => return Err(e),
    };
    if img.width() <= max_pixels && img.height() <= max_pixels {
        return Ok(page);
    }

    let resized = img.resize(max_pixels, max_pixels, FilterType::Lanczos3);
    debug!(
        "Page {}: downscaled {}x{} → {}x{}",
        page.page_num,
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );

    let mut buf = Vec::new();
    resized.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(PageImage::new(page.page_num, buf, "image/png"))
}

/// Base64-wrap a page for the multimodal request body.
pub fn to_image_data(page: &PageImage) -> ImageData {
    let b64 = STANDARD.encode(&page.bytes);
    debug!("Page {}: {} bytes base64", page.page_num, b64.len());
    ImageData::new(b64, page.mime_type.clone()).with_detail("high")
}
