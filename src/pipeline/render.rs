//! PDF rasterisation: write every page of a PDF as a PNG into a scratch dir.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! [`rasterize_pdf`] moves the whole pass onto the blocking pool so the
//! Tokio workers keep serving the page requests of other documents.
//!
//! Pages are rendered one after another in document order and named
//! `page-0001.png`, `page-0002.png`, …, so sorting the file names restores
//! physical page order.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a PDF into page images on disk. Blocking.
pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf` into `out_dir`, returning the written
    /// files in page order. Zero pages is an error, never an empty success.
    fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}

/// Rendering knobs taken from [`ExtractionConfig`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
    pub password: Option<String>,
}

impl RenderOptions {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
        }
    }
}

/// File name for a 1-indexed page.
pub fn page_file_name(page_num: usize) -> String {
    format!("page-{page_num:04}.png")
}

/// [`Rasterizer`] backed by pdfium.
///
/// Binds to the library at `PDFIUM_LIB_PATH` (a file, or a directory holding
/// the platform library) when set, else to the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match configured {
            Some(path) => {
                let lib = if path.is_dir() {
                    PathBuf::from(Pdfium::pdfium_platform_library_name_at_path(&path))
                } else {
                    path
                };
                debug!("Binding pdfium at {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_system_library(),
        };

        bindings
            .map(Pdfium::new)
            .map_err(|e| ExtractError::RasterizationFailed {
                detail: format!("pdfium library unavailable: {e}"),
            })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf: &Path,
        out_dir: &Path,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let pdfium = self.bind()?;

        let password = options.password.as_deref();
        let document = pdfium.load_pdf_from_file(pdf, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                ExtractError::PasswordRequired {
                    path: pdf.to_path_buf(),
                }
            } else {
                ExtractError::RasterizationFailed { detail: err_str }
            }
        })?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(ExtractError::RasterizationFailed {
                detail: "the PDF has no pages".into(),
            });
        }
        info!("PDF loaded: {} pages", total);

        let max = options.max_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(max)
            .set_maximum_height(max);

        let mut written = Vec::with_capacity(total);
        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let image = page
                .render_with_config(&render_config)
                .map_err(|e| ExtractError::RasterizationFailed {
                    detail: format!("page {page_num}: {e:?}"),
                })?
                .as_image();

            let path = out_dir.join(page_file_name(page_num));
            image
                .save_with_format(&path, ImageFormat::Png)
                .map_err(|e| ExtractError::RasterizationFailed {
                    detail: format!("page {page_num}: could not write image: {e}"),
                })?;
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            written.push(path);
        }

        Ok(written)
    }
}

/// Run a rasterizer on the blocking pool.
pub async fn rasterize_pdf(
    rasterizer: Arc<dyn Rasterizer>,
    pdf: &Path,
    out_dir: &Path,
    options: RenderOptions,
) -> Result<Vec<PathBuf>, ExtractError> {
    let pdf = pdf.to_path_buf();
    let out_dir = out_dir.to_path_buf();

    let files = tokio::task::spawn_blocking(move || rasterizer.rasterize(&pdf, &out_dir, &options))
        .await
        .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))??;

    if files.is_empty() {
        return Err(ExtractError::RasterizationFailed {
            detail: "no page images were produced".into(),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;

    impl Rasterizer for Empty {
        fn rasterize(&self, _: &Path, _: &Path, _: &RenderOptions) -> Result<Vec<PathBuf>, ExtractError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn page_names_sort_in_page_order() {
        let mut names: Vec<_> = [10, 2, 1, 100].into_iter().map(page_file_name).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["page-0001.png", "page-0002.png", "page-0010.png", "page-0100.png"]
        );
    }

    #[tokio::test]
    async fn empty_rasterization_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let options = RenderOptions::from_config(&ExtractionConfig::default());
        let err = rasterize_pdf(Arc::new(Empty), Path::new("x.pdf"), dir.path(), options)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::RasterizationFailed { .. }));
    }

    #[test]
    fn missing_library_is_a_rasterization_error() {
        let r = PdfiumRasterizer::with_library_path("/nonexistent/libpdfium.so");
        let dir = tempfile::tempdir().unwrap();
        let options = RenderOptions::from_config(&ExtractionConfig::default());
        let err = r
            .rasterize(Path::new("x.pdf"), dir.path(), &options)
            .unwrap_err();
        assert!(matches!(err, ExtractError::RasterizationFailed { .. }));
    }
}
