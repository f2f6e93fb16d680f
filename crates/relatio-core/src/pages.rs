//! Page-location backfill for references missing page numbers.
//!
//! The source text carries page markers in one of two forms: the modern
//! bracketed `[PAGE N]` token or a legacy `Page N` line. One scan builds an
//! offset index; each reference lacking pages is then located by a short
//! prefix of its citation text and assigned the page of the closest
//! preceding marker.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::record::CandidateRef;

static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\[PAGE\s+(\d+)\]|(?:^|\n|\x0c)\s*Page\s+(\d+))").unwrap()
});

/// Characters assumed per page when the text carries no markers at all.
const CHARS_PER_PAGE: usize = 3000;

/// How much of the search text is matched against the source. Longer
/// snippets are too fragile against whitespace drift in converted text.
const SEARCH_PREFIX_LEN: usize = 50;

/// Byte offset of each page marker, paired with its page number, in
/// document order.
pub fn build_page_map(text: &str) -> Vec<(usize, u32)> {
    let mut map: Vec<(usize, u32)> = Vec::new();
    for caps in PAGE_MARKER.captures_iter(text) {
        let digits = caps.get(1).or_else(|| caps.get(2));
        if let (Some(whole), Some(digits)) = (caps.get(0), digits)
            && let Ok(page) = digits.as_str().parse::<u32>()
        {
            map.push((whole.start(), page));
        }
    }
    if map.is_empty() {
        // Markerless text: assume a uniform page length.
        for i in 0..(text.len() / CHARS_PER_PAGE + 1) {
            map.push((i * CHARS_PER_PAGE, i as u32 + 1));
        }
    }
    map
}

/// Locate `snippet` in `full_text` and return the enclosing page, if any.
/// Matches precede all markers default to page 1.
pub fn find_pages_for_text(snippet: &str, full_text: &str, page_map: &[(usize, u32)]) -> Vec<u32> {
    let prefix_end = snippet
        .char_indices()
        .nth(SEARCH_PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(snippet.len());
    let prefix = &snippet[..prefix_end];
    if prefix.is_empty() {
        return vec![];
    }
    let Some(idx) = full_text.find(prefix) else {
        return vec![];
    };
    let mut found = 1;
    for &(offset, page) in page_map {
        if offset <= idx {
            found = page;
        } else {
            break;
        }
    }
    vec![found]
}

/// Assign pages to every reference lacking them, searching by citation
/// text, then context paragraph, then title. References whose text cannot
/// be located keep an empty page set.
pub fn backfill_missing_pages(refs: &mut [CandidateRef], source_text: &str) {
    let page_map = build_page_map(source_text);
    for r in refs.iter_mut() {
        if !r.page_numbers.is_empty() {
            continue;
        }
        let search = r
            .exact_citation_text
            .as_deref()
            .or(r.context_paragraph.as_deref())
            .or(r.referenced_document_title.as_deref());
        if let Some(search) = search {
            let pages = find_pages_for_text(search, source_text, &page_map);
            if !pages.is_empty() {
                debug!(pages = ?pages, "backfilled page numbers from source text");
                r.page_numbers = pages;
            }
        }
    }
}
