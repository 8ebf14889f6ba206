//! Input resolution: turn a path or URL into a local file of a known kind.
//!
//! Downloads land in the request's scratch directory so they are removed
//! together with the rendered pages. The kind (PDF or raster image) is taken
//! from the file's magic bytes, never from its extension: uploads routinely
//! arrive as `scan.pdf` holding a JPEG.

use crate::error::ExtractError;
use image::ImageFormat;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SNIFF_LEN: usize = 16;

/// What the source file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    /// A single raster page.
    Image(ImageFormat),
}

/// A local source file ready for rasterisation.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Classify a file by its leading bytes.
pub fn detect_kind(head: &[u8]) -> Option<SourceKind> {
    if head.starts_with(b"%PDF") {
        return Some(SourceKind::Pdf);
    }
    match image::guess_format(head) {
        Ok(fmt) => Some(SourceKind::Image(fmt)),
        Err(_) => None,
    }
}

/// Resolve the input string to a local file. URLs are downloaded into `scratch`.
pub async fn resolve_input(
    input: &str,
    scratch: &Path,
    timeout_secs: u64,
) -> Result<ResolvedInput, ExtractError> {
    let input = input.trim();
    if input.is_empty() || (input.contains("://") && !is_url(input)) {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    }

    if is_url(input) {
        download_url(input, scratch, timeout_secs).await
    } else {
        resolve_local(Path::new(input))
    }
}

/// Validate a local file and sniff its kind.
pub fn resolve_local(path: &Path) -> Result<ResolvedInput, ExtractError> {
    let path = path.to_path_buf();
    if !path.exists() {
        return Err(ExtractError::FileNotFound { path });
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(SNIFF_LEN as u64)
                .read_to_end(&mut head)
                .map_err(|e| ExtractError::Internal(format!("Failed to read input: {e}")))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(ExtractError::FileNotFound { path });
        }
    }

    let kind = detect_kind(&head).ok_or_else(|| ExtractError::UnsupportedFormat {
        path: path.clone(),
        magic: head.iter().take(8).copied().collect(),
    })?;

    debug!("Resolved local {:?}: {}", kind, path.display());
    Ok(ResolvedInput { path, kind })
}

/// Download a URL into the scratch directory.
async fn download_url(
    url: &str,
    scratch: &Path,
    timeout_secs: u64,
) -> Result<ResolvedInput, ExtractError> {
    info!("Downloading document from: {}", url);

    let download_failed = |reason: String| ExtractError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| download_failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            download_failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(download_failed(format!("HTTP {}", response.status())));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| download_failed(e.to_string()))?;

    let file_path = scratch.join(filename_from_url(url));
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to write download: {}", e)))?;

    let kind = detect_kind(&bytes[..bytes.len().min(SNIFF_LEN)]).ok_or_else(|| {
        ExtractError::UnsupportedFormat {
            path: file_path.clone(),
            magic: bytes.iter().take(8).copied().collect(),
        }
    })?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput {
        path: file_path,
        kind,
    })
}

/// Last URL path segment when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') && !last.starts_with("page-") {
                    return last.to_string();
                }
            }
        }
    }
    "download.bin".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/acta.pdf"));
        assert!(is_url("http://example.com/acta.pdf"));
        assert!(!is_url("/tmp/acta.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn detects_kinds_by_magic() {
        assert_eq!(detect_kind(b"%PDF-1.7\n"), Some(SourceKind::Pdf));
        assert_eq!(
            detect_kind(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
            Some(SourceKind::Image(ImageFormat::Png))
        );
        assert_eq!(
            detect_kind(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(SourceKind::Image(ImageFormat::Jpeg))
        );
        assert_eq!(detect_kind(b"GIF89a\x01\x00"), Some(SourceKind::Image(ImageFormat::Gif)));
        assert_eq!(detect_kind(b"PK\x03\x04"), None);
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.mx/docs/acta.pdf?x=1"), "acta.pdf");
        assert_eq!(filename_from_url("https://x.mx/docs/"), "download.bin");
        assert_eq!(filename_from_url("https://x.mx/page-0001.png"), "download.bin");
    }

    #[test]
    fn local_pdf_with_image_extension_is_pdf() {
        let mut f = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        f.write_all(b"%PDF-1.4 rest").unwrap();
        let r = resolve_local(f.path()).unwrap();
        assert_eq!(r.kind, SourceKind::Pdf);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = resolve_local(f.path()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn missing_file_and_bad_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input("/definitely/not/here.pdf", dir.path(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));

        let err = resolve_input("ftp://x.mx/a.pdf", dir.path(), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidInput { .. }));
    }
}
