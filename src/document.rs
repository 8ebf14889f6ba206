//! Request-level inputs: which kind of document, and the page images.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of legal document being processed.
///
/// Selects the page instruction, the fragment schema, and the merge strategy.
/// Fixed for the lifetime of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    /// Acta constitutiva: company incorporation facts.
    #[serde(alias = "acta-constitutiva")]
    IncorporationRecord,
    /// Lista de personas bloqueadas: sanctioned persons and entities.
    #[serde(alias = "lista-bloqueados")]
    SanctionsList,
}

impl DocumentType {
    /// Selector used on the wire (upload forms, CLI).
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::IncorporationRecord => "acta-constitutiva",
            DocumentType::SanctionsList => "lista-bloqueados",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acta-constitutiva" | "incorporation-record" | "incorporationrecord" => {
                Ok(DocumentType::IncorporationRecord)
            }
            "lista-bloqueados" | "sanctions-list" | "sanctionslist" => {
                Ok(DocumentType::SanctionsList)
            }
            _ => Err(ExtractError::UnsupportedDocumentType {
                value: s.to_string(),
            }),
        }
    }
}

/// One rasterised page, ready to be shown to the model.
#[derive(Clone)]
pub struct PageImage {
    /// 1-indexed position in the source document.
    pub page_num: usize,
    /// Encoded image bytes (PNG, JPEG, …).
    pub bytes: Vec<u8>,
    /// MIME type matching `bytes`.
    pub mime_type: String,
}

impl PageImage {
    pub fn new(page_num: usize, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            page_num,
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Build a page from raw bytes, sniffing the MIME type from the content.
    pub fn from_bytes(page_num: usize, bytes: Vec<u8>) -> Self {
        let mime_type = match image::guess_format(&bytes) {
            Ok(format) => format.to_mime_type().to_string(),
            Err(_) => "application/octet-stream".to_string(),
        };
        Self {
            page_num,
            bytes,
            mime_type,
        }
    }
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_selectors() {
        assert_eq!(
            "acta-constitutiva".parse::<DocumentType>().unwrap(),
            DocumentType::IncorporationRecord
        );
        assert_eq!(
            " Lista-Bloqueados ".parse::<DocumentType>().unwrap(),
            DocumentType::SanctionsList
        );
        assert_eq!(
            "sanctions-list".parse::<DocumentType>().unwrap(),
            DocumentType::SanctionsList
        );
    }

    #[test]
    fn rejects_unknown_selector() {
        let err = "factura".parse::<DocumentType>().unwrap_err();
        assert!(matches!(
            err,
            ExtractError::UnsupportedDocumentType { ref value } if value == "factura"
        ));
    }

    #[test]
    fn serde_accepts_both_spellings() {
        let a: DocumentType = serde_json::from_str("\"lista-bloqueados\"").unwrap();
        let b: DocumentType = serde_json::from_str("\"sanctions-list\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&DocumentType::IncorporationRecord).unwrap(),
            "\"incorporation-record\""
        );
    }

    #[test]
    fn page_image_sniffs_png() {
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\0".to_vec();
        let page = PageImage::from_bytes(1, png);
        assert_eq!(page.mime_type, "image/png");
    }
}
