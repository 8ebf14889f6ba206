//! Extraction results: the merged record plus per-page diagnostics.

use crate::error::PageError;
use crate::record::MergedRecord;
use serde::{Deserialize, Serialize};

/// Everything one extraction request produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutput {
    /// The merged document record.
    pub record: MergedRecord,
    /// One outcome per page, in page order.
    pub pages: Vec<PageOutcome>,
    pub stats: ExtractionStats,
}

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Whether the page contributed a fragment to the merge.
    pub produced_fragment: bool,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries spent before the final attempt.
    pub retries: u32,
    /// Why the page was dropped, if it was.
    pub error: Option<PageError>,
}

impl PageOutcome {
    /// True when the model answered with nothing usable but no error either.
    pub fn is_blank(&self) -> bool {
        !self.produced_fragment && self.error.is_none()
    }
}

/// Aggregate counters for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub total_pages: usize,
    /// Pages that contributed a fragment.
    pub extracted_pages: usize,
    /// Pages the model saw as blank.
    pub blank_pages: usize,
    /// Pages that failed and were left out of the merge.
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    /// Time spent turning the source into page images.
    pub render_duration_ms: u64,
    /// Time spent waiting on the model across all pages (wall clock).
    pub llm_duration_ms: u64,
}

impl ExtractionStats {
    /// Tally counters from page outcomes. Durations are left at zero.
    pub fn from_pages(pages: &[PageOutcome]) -> Self {
        Self {
            total_pages: pages.len(),
            extracted_pages: pages.iter().filter(|p| p.produced_fragment).count(),
            blank_pages: pages.iter().filter(|p| p.is_blank()).count(),
            failed_pages: pages.iter().filter(|p| p.error.is_some()).count(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(page_num: usize, produced: bool, error: Option<PageError>) -> PageOutcome {
        PageOutcome {
            page_num,
            produced_fragment: produced,
            input_tokens: 100,
            output_tokens: 10,
            duration_ms: 5,
            retries: 0,
            error,
        }
    }

    #[test]
    fn stats_count_each_kind_of_page() {
        let pages = vec![
            outcome(1, true, None),
            outcome(2, false, None),
            outcome(
                3,
                false,
                Some(PageError::Timeout { page: 3, secs: 60 }),
            ),
        ];
        let stats = ExtractionStats::from_pages(&pages);
        assert_eq!(stats.total_pages, 3);
        assert_eq!(stats.extracted_pages, 1);
        assert_eq!(stats.blank_pages, 1);
        assert_eq!(stats.failed_pages, 1);
        assert_eq!(stats.total_input_tokens, 300);
    }

    #[test]
    fn page_errors_serialise_in_outcomes() {
        let o = outcome(
            2,
            false,
            Some(PageError::MalformedExtraction {
                page: 2,
                detail: "invalid JSON".into(),
                raw: "nope".into(),
            }),
        );
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["pageNum"], 2);
        assert_eq!(json["error"]["MalformedExtraction"]["raw"], "nope");
    }
}
