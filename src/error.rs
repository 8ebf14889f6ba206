//! Error types for the kyc-ocr-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`] is **fatal**. The request cannot produce a record at all
//!   (unknown document type, unreadable source, every page failed). Returned
//!   as `Err(ExtractError)` from the top-level `process*` functions.
//!
//! * [`PageError`] is **non-fatal**. A single page failed (unusable model
//!   answer, transient API error) but the other pages still contribute.
//!   Stored inside [`crate::output::PageOutcome`] so callers can see which
//!   pages were dropped from the merge and why.
//!
//! A third, narrow type, [`ModelError`], is what a
//! [`crate::pipeline::llm::VisionModel`] reports. The page stage maps it onto
//! [`PageError`] after retries are exhausted.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the kyc-ocr-extract library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The document-type selector is not one of the supported values.
    #[error("Unsupported document type '{value}'. Expected 'acta-constitutiva' or 'lista-bloqueados'.")]
    UnsupportedDocumentType { value: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file is neither a PDF nor a raster image we can send to the model.
    #[error("Unsupported file format for '{path}': first bytes {magic:?}")]
    UnsupportedFormat { path: PathBuf, magic: Vec<u8> },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// The source could not be turned into page images (corrupt, empty, no pdfium).
    #[error("Could not convert the document to page images: {detail}")]
    RasterizationFailed { detail: String },

    /// PDF requires a password but none (or a wrong one) was provided.
    #[error("PDF '{path}' is encrypted and requires a valid password.")]
    PasswordRequired { path: PathBuf },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Every page failed or came back blank; nothing to merge.
    #[error("No data could be extracted from any of the {total} pages.{}", first_error_suffix(.first_error))]
    NoDataExtracted {
        total: usize,
        first_error: Option<String>,
    },

    /// The provider kept rate-limiting and the configuration asks to abort.
    #[error("Rate limit exceeded on page {page}; aborting the batch")]
    RateLimitExceeded {
        page: usize,
        retry_after_secs: Option<u64>,
    },

    /// The whole document exceeded `document_timeout_secs`.
    #[error("Document processing timed out after {secs}s")]
    DocumentTimeout { secs: u64 },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn first_error_suffix(first_error: &Option<String>) -> String {
    first_error
        .as_ref()
        .map(|e| format!(" First error: {e}"))
        .unwrap_or_default()
}

impl ExtractError {
    /// Message safe to show to an untrusted caller.
    ///
    /// Internal detail (paths of scratch files, provider hints, task panics)
    /// stays in the logs; the caller only learns which class of failure hit.
    pub fn user_message(&self) -> String {
        match self {
            ExtractError::UnsupportedDocumentType { .. }
            | ExtractError::InvalidInput { .. }
            | ExtractError::DownloadTimeout { .. }
            | ExtractError::RateLimitExceeded { .. }
            | ExtractError::DocumentTimeout { .. }
            | ExtractError::InvalidConfig(_) => self.to_string(),
            ExtractError::FileNotFound { .. } | ExtractError::PermissionDenied { .. } => {
                "The document could not be read.".to_string()
            }
            ExtractError::DownloadFailed { .. } => "The document could not be downloaded.".to_string(),
            ExtractError::UnsupportedFormat { .. } => {
                "Unsupported file type. Upload a PDF or an image.".to_string()
            }
            ExtractError::RasterizationFailed { .. } => {
                "The PDF appears to be corrupt, empty, or protected.".to_string()
            }
            ExtractError::PasswordRequired { .. } => {
                "The PDF is password protected.".to_string()
            }
            ExtractError::NoDataExtracted { .. } => {
                "The document is not legible or no data was found.".to_string()
            }
            ExtractError::ProviderNotConfigured { .. } | ExtractError::Internal(_) => {
                "An unexpected error occurred while processing the document.".to_string()
            }
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::RateLimitExceeded { .. }
                | ExtractError::DocumentTimeout { .. }
                | ExtractError::DownloadTimeout { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// The page contributes no fragment; the merge continues with the others.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The model answered, but not with the JSON shape the document type needs.
    #[error("Page {page}: malformed extraction: {detail}")]
    MalformedExtraction {
        page: usize,
        detail: String,
        raw: String,
    },

    /// The provider kept returning rate-limit / quota signals.
    #[error("Page {page}: rate limit exceeded after {retries} retries")]
    RateLimitExceeded {
        page: usize,
        retries: u32,
        retry_after_secs: Option<u64>,
    },

    /// Network or provider failure after retries.
    #[error("Page {page}: model call failed after {retries} retries: {detail}")]
    Transport {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The model call exceeded `api_timeout_secs` on every attempt.
    #[error("Page {page}: model call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The page image could not be prepared for upload.
    #[error("Page {page}: image preparation failed: {detail}")]
    ImageFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::MalformedExtraction { page, .. }
            | PageError::RateLimitExceeded { page, .. }
            | PageError::Transport { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::ImageFailed { page, .. } => *page,
        }
    }
}

/// Failure reported by a vision model backend for one submission.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// HTTP 429 / quota exhaustion.
    #[error("rate limited: {detail}")]
    RateLimited {
        detail: String,
        retry_after_secs: Option<u64>,
    },

    /// Anything else that prevented a response from arriving.
    #[error("transport error: {0}")]
    Transport(String),
}
