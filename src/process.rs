//! Pipeline orchestration: page images in, one merged record out.
//!
//! The entry points differ only in where pages come from:
//!
//! * [`process_document`] / [`extract_document`]: pages already in memory
//! * [`process_file`]: a local path or HTTP(S) URL, PDF or raster image
//! * [`process_bytes`]: an in-memory upload
//!
//! Pages are extracted concurrently (`buffer_unordered`) and merged strictly
//! in page order once every page has been attempted. A failed page only
//! drops that page; the request fails when no page contributed anything.

use crate::config::ExtractionConfig;
use crate::document::{DocumentType, PageImage};
use crate::error::{ExtractError, PageError};
use crate::merge::merge_fragments;
use crate::output::{ExtractionOutput, ExtractionStats, PageOutcome};
use crate::pipeline::encode;
use crate::pipeline::input::{self, ResolvedInput, SourceKind};
use crate::pipeline::llm::resolve_vision_model;
use crate::pipeline::page::{PageExtractor, PageRun, RetryPolicy};
use crate::pipeline::render::{self, PdfiumRasterizer, Rasterizer, RenderOptions};
use crate::pipeline::scratch::ScratchDir;
use crate::record::MergedRecord;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extract and merge a document whose pages are already rasterised.
///
/// `images` must be in physical page order; page numbers are taken from
/// each [`PageImage`].
pub async fn process_document(
    images: Vec<PageImage>,
    document_type: DocumentType,
    config: &ExtractionConfig,
) -> Result<MergedRecord, ExtractError> {
    Ok(extract_document(images, document_type, config).await?.record)
}

/// Like [`process_document`], also returning per-page outcomes and stats.
pub async fn extract_document(
    images: Vec<PageImage>,
    document_type: DocumentType,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    with_document_timeout(config, extract_pages(images, document_type, config, 0)).await
}

/// Extract a document from a local path or an HTTP(S) URL.
///
/// PDFs are rasterised into a request-scoped scratch directory; PNG and JPEG
/// files are sent as a single page. The scratch directory is released
/// whether extraction succeeds, fails or times out.
///
/// # Example
/// ```rust,no_run
/// use kyc_ocr_extract::{process_file, DocumentType, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::default();
/// let output = process_file("acta.pdf", DocumentType::IncorporationRecord, &config).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn process_file(
    input: impl AsRef<str>,
    document_type: DocumentType,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let input = input.as_ref();
    info!("Starting {} extraction: {}", document_type, input);

    let scratch = ScratchDir::new(config.cleanup_attempts)?;
    let result = with_document_timeout(
        config,
        extract_source(input, document_type, config, scratch.path()),
    )
    .await;
    scratch.release().await;
    result
}

/// Extract a document held in memory (PDF or image bytes).
pub async fn process_bytes(
    bytes: &[u8],
    document_type: DocumentType,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is deleted when it goes out of scope after `process_file` returns
    process_file(&path, document_type, config).await
}

/// Blocking wrapper around [`process_file`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn process_file_sync(
    input: impl AsRef<str>,
    document_type: DocumentType,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_file(input, document_type, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Bound a future by `document_timeout_secs`. Dropping the future on expiry
/// abandons every in-flight page request.
async fn with_document_timeout<F>(
    config: &ExtractionConfig,
    fut: F,
) -> Result<ExtractionOutput, ExtractError>
where
    F: Future<Output = Result<ExtractionOutput, ExtractError>>,
{
    match config.document_timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| {
                warn!("Document timed out after {}s", secs);
                ExtractError::DocumentTimeout { secs }
            })?,
        None => fut.await,
    }
}

async fn extract_source(
    input: &str,
    document_type: DocumentType,
    config: &ExtractionConfig,
    scratch: &Path,
) -> Result<ExtractionOutput, ExtractError> {
    let resolved = input::resolve_input(input, scratch, config.download_timeout_secs).await?;

    let render_start = Instant::now();
    let images = load_pages(&resolved, config, scratch).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Prepared {} page image(s) in {}ms", images.len(), render_duration_ms);

    extract_pages(images, document_type, config, render_duration_ms).await
}

/// Produce page images, 1-indexed and in page order.
async fn load_pages(
    resolved: &ResolvedInput,
    config: &ExtractionConfig,
    scratch: &Path,
) -> Result<Vec<PageImage>, ExtractError> {
    match resolved.kind {
        SourceKind::Image(format) => {
            let bytes = read_page(&resolved.path).await?;
            Ok(vec![PageImage::new(1, bytes, format.to_mime_type())])
        }
        SourceKind::Pdf => {
            let rasterizer = config
                .rasterizer
                .clone()
                .unwrap_or_else(|| Arc::new(PdfiumRasterizer::new()) as Arc<dyn Rasterizer>);
            let files = render::rasterize_pdf(
                rasterizer,
                &resolved.path,
                scratch,
                RenderOptions::from_config(config),
            )
            .await?;

            let mut images = Vec::with_capacity(files.len());
            for (idx, path) in files.iter().enumerate() {
                images.push(PageImage::from_bytes(idx + 1, read_page(path).await?));
            }
            Ok(images)
        }
    }
}

async fn read_page(path: &Path) -> Result<Vec<u8>, ExtractError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::RasterizationFailed {
            detail: format!("could not read page image {}: {e}", path.display()),
        })
}

async fn extract_pages(
    images: Vec<PageImage>,
    document_type: DocumentType,
    config: &ExtractionConfig,
    render_duration_ms: u64,
) -> Result<ExtractionOutput, ExtractError> {
    let total_start = Instant::now();
    let total_pages = images.len();

    let model = resolve_vision_model(config)?;
    let extractor = Arc::new(PageExtractor::new(model, config.system_prompt.as_deref()));
    let policy = RetryPolicy::from_config(config);

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages);
    }

    let llm_start = Instant::now();
    let mut pages = stream::iter(images.into_iter().map(|image| {
        let extractor = Arc::clone(&extractor);
        let policy = policy.clone();
        let callback = config.progress_callback.clone();
        let max_pixels = config.max_rendered_pixels;
        async move {
            let page_num = image.page_num;
            if let Some(ref cb) = callback {
                cb.on_page_start(page_num, total_pages);
            }

            let run = match prepare(image, max_pixels).await {
                Ok(image) => {
                    extractor
                        .extract_with_retry(&image, document_type, &policy)
                        .await
                }
                Err(error) => {
                    warn!("{}", error);
                    failed_run(page_num, error)
                }
            };

            if let Some(ref cb) = callback {
                match &run.outcome.error {
                    None => cb.on_page_complete(page_num, total_pages, run.fragment.is_some()),
                    Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }
            run
        }
    }))
    .buffer_unordered(config.concurrency);

    let mut runs: Vec<PageRun> = Vec::with_capacity(total_pages);
    while let Some(run) = pages.next().await {
        if let Some(PageError::RateLimitExceeded {
            page,
            retry_after_secs,
            ..
        }) = &run.outcome.error
        {
            if config.abort_on_rate_limit {
                warn!("Page {} still rate-limited; aborting the batch", page);
                return Err(ExtractError::RateLimitExceeded {
                    page: *page,
                    retry_after_secs: *retry_after_secs,
                });
            }
        }
        runs.push(run);
    }
    drop(pages);
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // Merge order must follow page order, not completion order.
    runs.sort_by_key(|r| r.outcome.page_num);

    let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(runs.len());
    let mut fragments = Vec::with_capacity(runs.len());
    for run in runs {
        outcomes.push(run.outcome);
        fragments.extend(run.fragment);
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(total_pages, fragments.len());
    }

    if fragments.is_empty() {
        let first_error = outcomes
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string());
        return Err(ExtractError::NoDataExtracted {
            total: total_pages,
            first_error,
        });
    }

    debug!("Merging {} fragment(s)", fragments.len());
    let record = merge_fragments(document_type, &fragments, config.name_policy);

    let stats = ExtractionStats {
        total_duration_ms: total_start.elapsed().as_millis() as u64 + render_duration_ms,
        render_duration_ms,
        llm_duration_ms,
        ..ExtractionStats::from_pages(&outcomes)
    };

    info!(
        "Extraction complete: {}/{} pages contributed, {} failed, {}ms",
        stats.extracted_pages, stats.total_pages, stats.failed_pages, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        record,
        pages: outcomes,
        stats,
    })
}

/// Downscale on the blocking pool; decoding a 4000 px scan is not cheap.
async fn prepare(image: PageImage, max_pixels: u32) -> Result<PageImage, PageError> {
    let page = image.page_num;
    tokio::task::spawn_blocking(move || encode::prepare_page(image, max_pixels))
        .await
        .map_err(|e| PageError::ImageFailed {
            page,
            detail: format!("image task panicked: {e}"),
        })?
        .map_err(|e| PageError::ImageFailed {
            page,
            detail: e.to_string(),
        })
}

fn failed_run(page_num: usize, error: PageError) -> PageRun {
    PageRun {
        outcome: PageOutcome {
            page_num,
            produced_fragment: false,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: Some(error),
        },
        fragment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn undecodable_page_becomes_image_error() {
        let err = prepare(PageImage::new(7, b"garbage".to_vec(), "image/png"), 100)
            .await
            .unwrap_err();
        assert_eq!(err.page(), 7);
        assert!(matches!(err, PageError::ImageFailed { .. }));
    }

    #[tokio::test]
    async fn document_timeout_is_reported() {
        let config = ExtractionConfig::builder()
            .document_timeout_secs(1)
            .build()
            .unwrap();
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err::<ExtractionOutput, _>(ExtractError::Internal("unreachable".into()))
        };
        let err = with_document_timeout(&config, slow).await.unwrap_err();
        assert!(matches!(err, ExtractError::DocumentTimeout { secs: 1 }));
    }
}
