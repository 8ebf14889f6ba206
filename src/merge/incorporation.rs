//! Merging acta constitutiva fragments into one [`IncorporationRecord`].
//!
//! Scalars are first-writer-wins, prose chunks are concatenated in page
//! order, and partners go through entity resolution: every partner lives in
//! one arena slot, and three indexes (tax id, personal id, normalized name)
//! point into the arena. A partner matched once stays merged for the rest of
//! the pass.

use crate::config::NamePolicy;
use crate::fragment::IncorporationFragment;
use crate::normalize::identity_key;
use crate::record::{IncorporationRecord, Partner};
use std::collections::HashMap;
use tracing::debug;

/// Merge page fragments, given in page order, into one record.
pub fn merge_incorporation<'a, I>(fragments: I, policy: NamePolicy) -> IncorporationRecord
where
    I: IntoIterator<Item = &'a IncorporationFragment>,
{
    let mut record = IncorporationRecord::default();
    let mut business_purpose = TextAccumulator::default();
    let mut management_body = TextAccumulator::default();
    let mut registration_data = TextAccumulator::default();
    let mut partners = PartnerArena::new(policy);

    for fragment in fragments {
        fill(&mut record.company_name, &fragment.company_name);
        fill(&mut record.company_tax_id, &fragment.company_tax_id);
        fill(&mut record.incorporation_date, &fragment.incorporation_date);
        fill(&mut record.capital, &fragment.capital);
        fill(&mut record.duration, &fragment.duration);
        fill(&mut record.notary_info, &fragment.notary_info);

        business_purpose.push(fragment.business_purpose_chunk.as_deref());
        management_body.push(fragment.management_body_chunk.as_deref());
        registration_data.push(fragment.registration_data_chunk.as_deref());

        for partner in &fragment.partners {
            partners.observe(partner);
        }

        for name in &fragment.legal_representative_names {
            let name = name.trim();
            if !name.is_empty() && !record.legal_representatives.iter().any(|r| r == name) {
                record.legal_representatives.push(name.to_string());
            }
        }
    }

    record.business_purpose = business_purpose.finish();
    record.management_body = management_body.finish();
    record.registration_data = registration_data.finish();
    record.partners = partners.into_partners();
    record
}

/// First writer wins: only an empty slot takes the incoming value.
pub(crate) fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    if slot.is_none() && incoming.is_some() {
        slot.clone_from(incoming);
        true
    } else {
        false
    }
}

/// Newline-joined prose collected across pages.
#[derive(Default)]
struct TextAccumulator(String);

impl TextAccumulator {
    fn push(&mut self, chunk: Option<&str>) {
        if let Some(chunk) = chunk {
            self.0.push_str(chunk);
            self.0.push('\n');
        }
    }

    fn finish(self) -> Option<String> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Lookup keys of one partner.
struct IdentityKeys {
    tax_id: Option<String>,
    personal_id: Option<String>,
    name: Option<String>,
}

impl IdentityKeys {
    fn of(p: &Partner) -> Self {
        Self {
            tax_id: identity_key(p.tax_id.as_deref()),
            personal_id: identity_key(p.personal_id.as_deref()),
            name: identity_key(p.name.as_deref()),
        }
    }
}

/// Partners seen so far plus the indexes that resolve keys to slots.
struct PartnerArena {
    policy: NamePolicy,
    slots: Vec<Partner>,
    by_tax_id: HashMap<String, usize>,
    by_personal_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl PartnerArena {
    fn new(policy: NamePolicy) -> Self {
        Self {
            policy,
            slots: Vec::new(),
            by_tax_id: HashMap::new(),
            by_personal_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn observe(&mut self, incoming: &Partner) {
        if !incoming.is_identifiable() {
            debug!("Skipping partner with no name, tax id or personal id");
            return;
        }

        let keys = IdentityKeys::of(incoming);
        match self.find(&keys) {
            Some(slot) => {
                self.absorb(slot, incoming);
                self.register(slot);
            }
            None => {
                self.slots.push(incoming.clone());
                let slot = self.slots.len() - 1;
                debug!(slot, "New partner {:?}", incoming.name);
                self.register(slot);
            }
        }
    }

    /// Resolve keys in priority order: tax id, personal id, normalized name.
    /// Personal-id and name hits are rejected when the stored partner carries
    /// a different tax id or personal id than the incoming one.
    fn find(&self, keys: &IdentityKeys) -> Option<usize> {
        if let Some(slot) = keys.tax_id.as_ref().and_then(|k| self.by_tax_id.get(k)) {
            return Some(*slot);
        }

        let candidates = [
            keys.personal_id.as_ref().and_then(|k| self.by_personal_id.get(k)),
            keys.name.as_ref().and_then(|k| self.by_name.get(k)),
        ];
        candidates
            .into_iter()
            .flatten()
            .copied()
            .find(|&slot| self.compatible(slot, keys))
    }

    fn compatible(&self, slot: usize, keys: &IdentityKeys) -> bool {
        let stored = IdentityKeys::of(&self.slots[slot]);
        let conflicts = |a: &Option<String>, b: &Option<String>| matches!((a, b), (Some(a), Some(b)) if a != b);
        let ok = !conflicts(&stored.tax_id, &keys.tax_id)
            && !conflicts(&stored.personal_id, &keys.personal_id);
        if !ok {
            debug!(slot, "Name or personal id matched a partner with different ids; keeping apart");
        }
        ok
    }

    /// Field-level completion of an existing partner.
    fn absorb(&mut self, slot: usize, incoming: &Partner) {
        let policy = self.policy;
        let existing = &mut self.slots[slot];

        if let (NamePolicy::PreferLonger, Some(new), Some(old)) =
            (policy, incoming.name.as_ref(), existing.name.as_ref())
        {
            if new.chars().count() > old.chars().count() {
                debug!(slot, "Replacing partner name {:?} with longer {:?}", old, new);
                existing.name = Some(new.clone());
            }
        }
        fill(&mut existing.name, &incoming.name);
        fill(&mut existing.tax_id, &incoming.tax_id);
        fill(&mut existing.personal_id, &incoming.personal_id);
        fill(&mut existing.nationality, &incoming.nationality);
        fill(&mut existing.address, &incoming.address);
        fill(&mut existing.contribution, &incoming.contribution);
    }

    /// Point every key of the slot at it, unless another slot owns the key already.
    fn register(&mut self, slot: usize) {
        let keys = IdentityKeys::of(&self.slots[slot]);
        if let Some(k) = keys.tax_id {
            self.by_tax_id.entry(k).or_insert(slot);
        }
        if let Some(k) = keys.personal_id {
            self.by_personal_id.entry(k).or_insert(slot);
        }
        if let Some(k) = keys.name {
            self.by_name.entry(k).or_insert(slot);
        }
    }

    fn into_partners(self) -> Vec<Partner> {
        self.slots
    }
}
