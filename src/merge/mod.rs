//! Cross-page merging.
//!
//! Pure and deterministic: the same fragments in the same order always give
//! the same record. Callers are responsible for page order.

mod incorporation;
mod sanctions;

pub use incorporation::merge_incorporation;
pub use sanctions::merge_sanctions;

use crate::config::NamePolicy;
use crate::document::DocumentType;
use crate::fragment::PageFragment;
use crate::record::MergedRecord;
use tracing::warn;

/// Merge fragments of one document into its record.
///
/// Fragments whose type differs from `document_type` are skipped.
pub fn merge_fragments(
    document_type: DocumentType,
    fragments: &[PageFragment],
    policy: NamePolicy,
) -> MergedRecord {
    let skipped = fragments
        .iter()
        .filter(|f| f.document_type() != document_type)
        .count();
    if skipped > 0 {
        warn!(
            "Ignoring {} fragment(s) that are not {}",
            skipped, document_type
        );
    }

    match document_type {
        DocumentType::IncorporationRecord => {
            let pages = fragments.iter().filter_map(|f| match f {
                PageFragment::Incorporation(p) => Some(p),
                PageFragment::Sanctions(_) => None,
            });
            MergedRecord::Incorporation(merge_incorporation(pages, policy))
        }
        DocumentType::SanctionsList => {
            let pages = fragments.iter().filter_map(|f| match f {
                PageFragment::Sanctions(p) => Some(p),
                PageFragment::Incorporation(_) => None,
            });
            MergedRecord::Sanctions(merge_sanctions(pages))
        }
    }
}
