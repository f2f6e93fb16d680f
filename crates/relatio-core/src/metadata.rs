//! Source document metadata extraction.
//!
//! Circulars converted to markdown carry their own identity in a loose
//! letterhead: the reference number and issue date sit in the first few
//! lines, the title on a `Sub:` line, and the page count either in a
//! `Page X of Y` footer or as the highest `[PAGE N]` marker.

use once_cell::sync::Lazy;
use regex::Regex;

static REF_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+/\d+/\d+/[\d()]+[-A-Z\d]+)").unwrap());

static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),?\s+(\d{4})",
    )
    .unwrap()
});

static SUB_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*Sub:\s*-?\s*|\*\*|Sub:\s*-?\s*").unwrap());

static PAGE_OF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Page\s+\*\*(\d+)\*\*\s+of\s+\*\*(\d+)\*\*").unwrap());

static PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[PAGE\s+(\d+)\]").unwrap());

/// Lines scanned for the reference number and issue date.
const HEADER_LINES: usize = 15;
/// Lines scanned for the `Sub:` title.
const TITLE_LINES: usize = 50;

/// Identity of the source circular, before the assembly timestamp is added.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeta {
    pub filename: String,
    pub circular_title: String,
    pub sebi_reference_number: String,
    pub date_issued: Option<String>,
    pub total_pages: u32,
}

impl SourceMeta {
    /// Fallback identity when the source text is unavailable.
    pub fn unknown(source_name: &str) -> Self {
        Self {
            filename: source_name.to_string(),
            circular_title: source_name.to_string(),
            sebi_reference_number: "Unknown".to_string(),
            date_issued: None,
            total_pages: 1,
        }
    }
}

fn month_number(name: &str) -> &'static str {
    match name {
        "January" => "01",
        "February" => "02",
        "March" => "03",
        "April" => "04",
        "May" => "05",
        "June" => "06",
        "July" => "07",
        "August" => "08",
        "September" => "09",
        "October" => "10",
        "November" => "11",
        _ => "12",
    }
}

/// Scan the document text for the circular's own identity fields. Every
/// field degrades to a default rather than failing.
pub fn extract_source_metadata(text: &str, source_name: &str) -> SourceMeta {
    let mut meta = SourceMeta::unknown(source_name);
    let lines: Vec<&str> = text.lines().take(TITLE_LINES).collect();

    for line in lines.iter().take(HEADER_LINES) {
        if let Some(caps) = REF_NUMBER.captures(line) {
            meta.sebi_reference_number = caps[1].to_string();
            break;
        }
    }

    for line in lines.iter().take(HEADER_LINES) {
        if let Some(caps) = LONG_DATE.captures(line) {
            let month = month_number(&caps[1]);
            let day = format!("{:0>2}", &caps[2]);
            meta.date_issued = Some(format!("{}-{}-{}", &caps[3], month, day));
            break;
        }
    }

    for line in &lines {
        let trimmed = line.trim();
        if trimmed.starts_with("**Sub:") || trimmed.starts_with("Sub:") {
            let title = SUB_PREFIX.replace_all(line, "").trim().to_string();
            if !title.is_empty() {
                meta.circular_title = title;
            }
            break;
        }
    }

    // "Page X of Y" footers win over raw page markers; last footer counts.
    if let Some(caps) = PAGE_OF.captures_iter(text).last() {
        if let Ok(total) = caps[2].parse() {
            meta.total_pages = total;
        }
    } else if let Some(max) = PAGE_MARKER
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .max()
    {
        meta.total_pages = max;
    }

    meta
}
