//! Pipeline stages for document extraction.
//!
//! Each submodule implements one step; [`crate::process`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ page (llm) ──▶ merge
//! (path/URL) (pdfium)  (resize)   (VLM + parse)   (crate::merge)
//!     └──────── scratch dir, released on every exit ────────┘
//! ```
//!
//! 1. [`input`]  : local path or download, PDF vs image by magic bytes
//! 2. [`render`] : rasterise PDFs on the blocking pool
//! 3. [`encode`] : cap image size, base64 for the request body
//! 4. [`llm`]    : the vision model capability and provider resolution
//! 5. [`page`]   : one request per page, retries, response decoding
//! 6. [`scratch`]: request-scoped temporary directory

pub mod encode;
pub mod input;
pub mod llm;
pub mod page;
pub mod render;
pub mod scratch;
