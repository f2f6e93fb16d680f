//! Identity matching and deduplication of candidate references.
//!
//! Identity is the pair (normalized title prefix, normalized document
//! number). Records sharing an identity are merged into one, unioning their
//! page sets; the first-seen record wins every other field. Within a title
//! group, records carrying no document number are absorbed into the first
//! identified sibling: an unidentified citation of the same title is assumed
//! to denote the same instrument rather than a phantom duplicate.

use std::collections::{BTreeSet, HashMap};

use crate::matching::{number_key, title_key};
use crate::record::CandidateRef;

/// Counters returned alongside the merged list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub duplicates_removed: usize,
    /// Reserved for field-level conflict detection; never incremented by the
    /// current merge logic.
    pub conflicts_resolved: usize,
}

/// Merge `target`'s page set with `other`'s, keeping the result sorted.
fn union_pages(target: &mut CandidateRef, other: &CandidateRef) {
    let pages: BTreeSet<u32> = target
        .page_numbers
        .iter()
        .chain(other.page_numbers.iter())
        .copied()
        .collect();
    target.page_numbers = pages.into_iter().collect();
}

/// Deduplicate a candidate list, preserving first-seen order.
pub fn deduplicate(refs: Vec<CandidateRef>) -> (Vec<CandidateRef>, MergeStats) {
    // Group by title key, insertion-ordered.
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<CandidateRef>> = HashMap::new();
    for r in refs {
        let key = title_key(r.referenced_document_title.as_deref().unwrap_or(""));
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            group_order.push(key);
        }
        group.push(r);
    }

    let mut merged: Vec<CandidateRef> = Vec::new();
    let mut stats = MergeStats::default();

    for key in group_order {
        let group = groups.remove(&key).unwrap_or_default();

        // Within the title group, collapse by document-number key.
        let mut numbered_order: Vec<String> = Vec::new();
        let mut numbered: HashMap<String, CandidateRef> = HashMap::new();
        let mut unnumbered: Vec<CandidateRef> = Vec::new();

        for r in group {
            let num = number_key(r.referenced_sebi_number.as_deref().unwrap_or(""));
            if num.is_empty() {
                // Identical unnumbered records collapse; distinct ones stay
                // separate until an identified sibling absorbs them below.
                if let Some(existing) = unnumbered.iter_mut().find(|u| **u == r) {
                    stats.duplicates_removed += 1;
                    union_pages(existing, &r);
                } else {
                    unnumbered.push(r);
                }
            } else if let Some(existing) = numbered.get_mut(&num) {
                stats.duplicates_removed += 1;
                union_pages(existing, &r);
            } else {
                numbered_order.push(num.clone());
                numbered.insert(num, r);
            }
        }

        if numbered.is_empty() {
            merged.extend(unnumbered);
        } else {
            // Absorb every unnumbered record into the first identified one.
            if !unnumbered.is_empty() {
                let first = numbered
                    .get_mut(&numbered_order[0])
                    .expect("first numbered key present");
                for u in &unnumbered {
                    stats.duplicates_removed += 1;
                    union_pages(first, u);
                }
            }
            for num in numbered_order {
                if let Some(r) = numbered.remove(&num) {
                    merged.push(r);
                }
            }
        }
    }

    (merged, stats)
}
