//! # kyc-ocr-extract
//!
//! Extract structured KYC data from scanned Mexican legal documents using
//! Vision Language Models (VLMs).
//!
//! Two document types are supported:
//!
//! * **Acta constitutiva** ([`DocumentType::IncorporationRecord`]): company
//!   name, RFC, incorporation date, partners, capital, notary, legal
//!   representatives and the free-text clauses.
//! * **Lista de personas bloqueadas** ([`DocumentType::SanctionsList`]):
//!   every listed person or entity with aliases, ids and the listing reason.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / image
//!  │
//!  ├─ 1. Input   resolve local file or download from URL
//!  ├─ 2. Render  rasterise pages via pdfium (spawn_blocking)
//!  ├─ 3. Encode  cap page size, base64 ImageData
//!  ├─ 4. VLM     one JSON request per page, concurrently
//!  ├─ 5. Decode  typed page fragments; bad answers drop only their page
//!  └─ 6. Merge   page order, first-writer-wins, partner/entry de-duplication
//! ```
//!
//! Pages are read independently: the model never sees other pages, so the
//! same partner can appear on five pages with five spellings. [`merge`]
//! reconciles them using tax id, CURP and an accent-insensitive name key
//! (see [`normalize`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kyc_ocr_extract::{process_file, DocumentType, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / KYC_LLM_PROVIDER + KYC_MODEL
//!     let config = ExtractionConfig::default();
//!     let output = process_file("acta.pdf", DocumentType::IncorporationRecord, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!("{} of {} pages contributed",
//!         output.stats.extracted_pages,
//!         output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `kyc-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod fragment;
pub mod merge;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod record;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, NamePolicy};
pub use document::{DocumentType, PageImage};
pub use error::{ExtractError, ModelError, PageError};
pub use fragment::{IncorporationFragment, PageFragment, PartialEntry, SanctionsFragment};
pub use merge::{merge_fragments, merge_incorporation, merge_sanctions};
pub use normalize::normalize;
pub use output::{ExtractionOutput, ExtractionStats, PageOutcome};
pub use pipeline::llm::{ModelReply, VisionModel};
pub use pipeline::page::{parse_page_response, PageExtractor};
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use process::{extract_document, process_bytes, process_document, process_file, process_file_sync};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{Capital, IncorporationRecord, MergedRecord, NotaryInfo, Partner, SanctionsEntry};
