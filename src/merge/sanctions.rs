//! Merging lista de personas bloqueadas fragments.
//!
//! Each row is keyed by its tax id, else its personal id, else its name,
//! through [`identity_key`]. Rows sharing a key collapse into one entry;
//! output keeps the order in which keys were first seen.

use super::incorporation::fill;
use crate::fragment::{PartialEntry, SanctionsFragment};
use crate::normalize::identity_key;
use crate::record::SanctionsEntry;
use std::collections::HashMap;
use tracing::debug;

/// Merge page fragments, given in page order, into one entry list.
pub fn merge_sanctions<'a, I>(fragments: I) -> Vec<SanctionsEntry>
where
    I: IntoIterator<Item = &'a SanctionsFragment>,
{
    let mut entries: Vec<SanctionsEntry> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for row in fragments.into_iter().flat_map(|f| f.entries.iter()) {
        let Some(full_name) = row.full_name.as_deref() else {
            debug!("Skipping sanctions row without a name");
            continue;
        };
        let Some(key) = entry_key(row) else {
            debug!("Skipping sanctions row {:?}: no usable key", full_name);
            continue;
        };

        match by_key.get(&key) {
            Some(&slot) => absorb(&mut entries[slot], row),
            None => {
                let mut entry = SanctionsEntry {
                    full_name: full_name.to_string(),
                    entry_type: None,
                    aliases: Vec::new(),
                    tax_id: None,
                    personal_id: None,
                    birth_date: None,
                    address: None,
                    reason: None,
                    source_list: None,
                };
                absorb(&mut entry, row);
                entries.push(entry);
                by_key.insert(key, entries.len() - 1);
            }
        }
    }

    entries
}

fn entry_key(row: &PartialEntry) -> Option<String> {
    identity_key(row.tax_id.as_deref())
        .or_else(|| identity_key(row.personal_id.as_deref()))
        .or_else(|| identity_key(row.full_name.as_deref()))
}

fn absorb(entry: &mut SanctionsEntry, row: &PartialEntry) {
    for alias in &row.aliases {
        let alias = alias.trim();
        if !alias.is_empty() && !entry.aliases.iter().any(|a| a == alias) {
            entry.aliases.push(alias.to_string());
        }
    }
    fill(&mut entry.entry_type, &row.entry_type);
    fill(&mut entry.tax_id, &row.tax_id);
    fill(&mut entry.personal_id, &row.personal_id);
    fill(&mut entry.birth_date, &row.birth_date);
    fill(&mut entry.address, &row.address);
    fill(&mut entry.reason, &row.reason);
    fill(&mut entry.source_list, &row.source_list);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> PartialEntry {
        PartialEntry {
            full_name: Some(name.into()),
            ..Default::default()
        }
    }

    fn page(rows: Vec<PartialEntry>) -> SanctionsFragment {
        SanctionsFragment { entries: rows }
    }

    #[test]
    fn same_name_across_pages_collapses() {
        let a = PartialEntry {
            aliases: vec!["El Güero".into()],
            reason: Some("Fraude".into()),
            ..row("Carlos Ramírez")
        };
        let b = PartialEntry {
            aliases: vec!["El Güero".into(), "Charly".into()],
            reason: Some("Otro".into()),
            birth_date: Some("1970-01-01".into()),
            ..row("CARLOS RAMIREZ")
        };
        let merged = merge_sanctions(&[page(vec![a]), page(vec![b])]);
        assert_eq!(merged.len(), 1);
        let e = &merged[0];
        assert_eq!(e.full_name, "Carlos Ramírez");
        assert_eq!(e.aliases, vec!["El Güero".to_string(), "Charly".into()]);
        assert_eq!(e.reason.as_deref(), Some("Fraude"));
        assert_eq!(e.birth_date.as_deref(), Some("1970-01-01"));
    }

    #[test]
    fn tax_id_outranks_name() {
        let a = PartialEntry {
            tax_id: Some("RARC700101AB1".into()),
            ..row("Carlos Ramírez")
        };
        let b = PartialEntry {
            tax_id: Some("RARC700101AB1".into()),
            ..row("Carlos Ramírez Cruz")
        };
        let c = PartialEntry {
            tax_id: Some("ZZZ999999ZZ9".into()),
            ..row("Carlos Ramírez")
        };
        let merged = merge_sanctions(&[page(vec![a, b, c])]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].full_name, "Carlos Ramírez");
        assert_eq!(merged[1].tax_id.as_deref(), Some("ZZZ999999ZZ9"));
    }

    #[test]
    fn personal_id_is_second_key() {
        let a = PartialEntry {
            personal_id: Some("RARC700101HDFMRR09".into()),
            ..row("C. Ramírez")
        };
        let b = PartialEntry {
            personal_id: Some("RARC700101HDFMRR09".into()),
            address: Some("Tijuana".into()),
            ..row("Carlos Ramírez")
        };
        let merged = merge_sanctions(&[page(vec![a]), page(vec![b])]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].address.as_deref(), Some("Tijuana"));
    }

    #[test]
    fn nameless_rows_are_skipped_and_order_is_kept() {
        let nameless = PartialEntry {
            tax_id: Some("AAA".into()),
            ..Default::default()
        };
        let merged = merge_sanctions(&[
            page(vec![row("Beta"), nameless]),
            page(vec![row("Alfa"), row("beta")]),
        ]);
        let names: Vec<_> = merged.iter().map(|e| e.full_name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Alfa"]);
    }

    #[test]
    fn non_latin_name_restated_across_pages_collapses() {
        let a = PartialEntry {
            aliases: vec!["Торговец смертью".into()],
            ..row("Виктор Бут")
        };
        let b = PartialEntry {
            birth_date: Some("1967-01-13".into()),
            ..row("ВИКТОР  БУТ")
        };
        let merged = merge_sanctions(&[page(vec![a]), page(vec![b, row("李明")])]);
        let names: Vec<_> = merged.iter().map(|e| e.full_name.as_str()).collect();
        assert_eq!(names, vec!["Виктор Бут", "李明"]);
        assert_eq!(merged[0].birth_date.as_deref(), Some("1967-01-13"));
        assert_eq!(merged[0].aliases, vec!["Торговец смертью".to_string()]);
    }

    #[test]
    fn symbol_only_names_are_kept_not_dropped() {
        let merged = merge_sanctions(&[page(vec![row("***"), row("***"), row("  ")])]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].full_name, "***");
        assert!(merged.iter().all(|e| !e.full_name.trim().is_empty()));
    }

    #[test]
    fn empty_pages_give_empty_list() {
        assert!(merge_sanctions(&[page(vec![]), page(vec![])]).is_empty());
    }
}
