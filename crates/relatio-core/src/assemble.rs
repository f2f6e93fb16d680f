//! Final output assembly: self-reference filtering, schema validation,
//! re-numbering, and summary statistics.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::dedup::MergeStats;
use crate::metadata::{SourceMeta, extract_source_metadata};
use crate::record::CandidateRef;
use crate::{
    DocumentType, ExtractionSource, FinalOutput, PIPELINE_VERSION, PageCoverage,
    ProcessingMetadata, Reference, RelationshipType, SourceDocument, SummaryStatistics,
    ValidationStatus,
};

static RUN_TOGETHER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([a-zA-Z0-9])").unwrap());

const DEFAULT_TITLE: &str = "Unknown SEBI Document";
const DEFAULT_CITATION: &str = "See document";
const DEFAULT_CONTEXT: &str = "Context unavailable";
const DEFAULT_SECTION: &str = "Not specified";
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Inputs that accompany the merged reference list into assembly.
pub struct AssemblyContext<'a> {
    pub source_text: &'a str,
    pub source_name: &'a str,
    pub consensus_model: &'a str,
    pub processing_time_seconds: u64,
    pub track_a_count: usize,
    pub track_b_count: usize,
    pub validation_status: ValidationStatus,
    pub warnings: Vec<String>,
}

/// Insert a space after a period that runs straight into the next word.
/// Converted text often collapses "No.ABC" style abbreviations.
fn clean_fmt(text: &str) -> String {
    RUN_TOGETHER.replace_all(text, ". ${1}").to_string()
}

/// Validate one candidate into the canonical schema, applying defaults.
fn validate_reference(r: &CandidateRef, index: usize) -> Reference {
    let mut pages: Vec<u32> = r.page_numbers.iter().copied().filter(|&p| p > 0).collect();
    pages.sort_unstable();
    pages.dedup();

    Reference {
        reference_id: format!("REF{:03}", index),
        referenced_document_title: clean_fmt(
            r.referenced_document_title.as_deref().unwrap_or(DEFAULT_TITLE),
        ),
        referenced_sebi_number: r.referenced_sebi_number.clone(),
        referenced_date: r.referenced_date.clone(),
        document_type: DocumentType::parse_lenient(r.document_type.as_deref().unwrap_or("")),
        relationship_type: RelationshipType::parse_lenient(
            r.relationship_type.as_deref().unwrap_or(""),
        ),
        page_numbers: pages,
        exact_citation_text: clean_fmt(
            r.exact_citation_text.as_deref().unwrap_or(DEFAULT_CITATION),
        ),
        context_paragraph: clean_fmt(r.context_paragraph.as_deref().unwrap_or(DEFAULT_CONTEXT)),
        section_location: r
            .section_location
            .clone()
            .unwrap_or_else(|| DEFAULT_SECTION.to_string()),
        confidence_score: r.confidence_score.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
        extraction_source: ExtractionSource::parse_lenient(
            r.extraction_source.as_deref().unwrap_or(""),
        ),
    }
}

fn confidence_bucket(score: f64) -> &'static str {
    if score > 0.9 {
        "high"
    } else if score >= 0.7 {
        "medium"
    } else {
        "low"
    }
}

fn summarize(references: &[Reference]) -> SummaryStatistics {
    let mut by_document_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_relationship_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_confidence_level: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_extraction_source: BTreeMap<String, usize> = BTreeMap::new();
    let mut pages: BTreeSet<u32> = BTreeSet::new();

    for r in references {
        *by_document_type
            .entry(r.document_type.as_str().to_string())
            .or_default() += 1;
        *by_relationship_type
            .entry(r.relationship_type.as_str().to_string())
            .or_default() += 1;
        *by_confidence_level
            .entry(confidence_bucket(r.confidence_score).to_string())
            .or_default() += 1;
        *by_extraction_source
            .entry(r.extraction_source.as_str().to_string())
            .or_default() += 1;
        pages.extend(r.page_numbers.iter().copied());
    }

    let pages_with_references: Vec<u32> = pages.into_iter().collect();
    SummaryStatistics {
        total_references_found: references.len(),
        by_document_type,
        by_relationship_type,
        by_confidence_level,
        by_extraction_source,
        page_coverage: PageCoverage {
            total_pages_covered: pages_with_references.len(),
            pages_with_references,
        },
    }
}

/// Build the complete output document from a merged reference list.
pub fn assemble_final_output(
    merged: &[CandidateRef],
    stats: MergeStats,
    ctx: AssemblyContext<'_>,
) -> FinalOutput {
    let source_meta = if ctx.source_text.is_empty() {
        SourceMeta::unknown(ctx.source_name)
    } else {
        extract_source_metadata(ctx.source_text, ctx.source_name)
    };

    let mut references: Vec<Reference> = Vec::with_capacity(merged.len());
    for r in merged {
        // The document must not cite itself.
        if let Some(num) = r.referenced_sebi_number.as_deref()
            && !num.is_empty()
            && num == source_meta.sebi_reference_number
        {
            info!(number = num, "filtering out self-reference");
            continue;
        }
        references.push(validate_reference(r, references.len() + 1));
    }
    if references.len() < merged.len() {
        warn!(
            dropped = merged.len() - references.len(),
            "dropped self-referencing entries during assembly"
        );
    }

    let summary_statistics = summarize(&references);

    let mut models_used = BTreeMap::new();
    models_used.insert("consensus".to_string(), ctx.consensus_model.to_string());

    FinalOutput {
        source_document: SourceDocument {
            filename: source_meta.filename,
            circular_title: source_meta.circular_title,
            sebi_reference_number: source_meta.sebi_reference_number,
            date_issued: source_meta.date_issued,
            total_pages: source_meta.total_pages,
            processing_timestamp: utc_timestamp(),
        },
        summary_statistics,
        processing_metadata: ProcessingMetadata {
            pipeline_version: PIPELINE_VERSION.to_string(),
            models_used,
            processing_time_seconds: ctx.processing_time_seconds,
            track_a_references_found: ctx.track_a_count,
            track_b_references_found: ctx.track_b_count,
            merged_count: references.len(),
            duplicates_removed: stats.duplicates_removed,
            conflicts_resolved: stats.conflicts_resolved,
            validation_status: ctx.validation_status,
            warnings: ctx.warnings,
        },
        references,
    }
}

/// Current UTC instant as `YYYY-MM-DDTHH:MM:SSZ`.
fn utc_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let secs_per_day = 86400u64;
    let (year, month, day) = days_to_ymd(now / secs_per_day);
    let time_of_day = now % secs_per_day;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60,
    )
}

/// Convert days since Unix epoch to (year, month, day).
fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    // Simplified civil calendar conversion
    let z = days + 719468;
    let era = z / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(source_text: &'a str) -> AssemblyContext<'a> {
        AssemblyContext {
            source_text,
            source_name: "circular.pdf",
            consensus_model: "gemini-2.0-flash",
            processing_time_seconds: 42,
            track_a_count: 3,
            track_b_count: 2,
            validation_status: ValidationStatus::Completed,
            warnings: vec![],
        }
    }

    fn cand(title: &str, number: Option<&str>) -> CandidateRef {
        CandidateRef {
            referenced_document_title: Some(title.to_string()),
            referenced_sebi_number: number.map(|n| n.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn clean_fmt_inserts_space_after_period() {
        assert_eq!(clean_fmt("Circular No.ABC dated"), "Circular No. ABC dated");
        assert_eq!(clean_fmt("ends cleanly."), "ends cleanly.");
        assert_eq!(clean_fmt("v1.2"), "v1. 2");
    }

    #[test]
    fn defaults_applied_to_sparse_record() {
        let output = assemble_final_output(&[CandidateRef::default()], MergeStats::default(), ctx(""));
        let r = &output.references[0];
        assert_eq!(r.referenced_document_title, "Unknown SEBI Document");
        assert_eq!(r.exact_citation_text, "See document");
        assert_eq!(r.context_paragraph, "Context unavailable");
        assert_eq!(r.section_location, "Not specified");
        assert_eq!(r.confidence_score, 0.8);
        assert_eq!(r.document_type, DocumentType::Other);
        assert_eq!(r.relationship_type, RelationshipType::RefersTo);
        assert_eq!(r.extraction_source, ExtractionSource::Both);
    }

    #[test]
    fn self_reference_excluded_and_ids_contiguous() {
        let source = "HO/38/44/12(1)2026-MIRSD-TPD1\n\nSub: Some circular\n";
        let merged = vec![
            cand("Earlier Circular", Some("SEBI/HO/1/2024")),
            cand("This Circular", Some("HO/38/44/12(1)2026-MIRSD-TPD1")),
            cand("Another Circular", Some("SEBI/HO/2/2024")),
        ];
        let output = assemble_final_output(&merged, MergeStats::default(), ctx(source));
        assert_eq!(output.references.len(), 2);
        assert_eq!(output.references[0].reference_id, "REF001");
        assert_eq!(output.references[1].reference_id, "REF002");
        assert!(
            output
                .references
                .iter()
                .all(|r| r.referenced_sebi_number.as_deref()
                    != Some("HO/38/44/12(1)2026-MIRSD-TPD1"))
        );
    }

    #[test]
    fn pages_sorted_deduped_and_positives_only() {
        let merged = vec![CandidateRef {
            page_numbers: vec![5, 2, 5, 0, 2],
            ..CandidateRef::default()
        }];
        let output = assemble_final_output(&merged, MergeStats::default(), ctx(""));
        assert_eq!(output.references[0].page_numbers, vec![2, 5]);
    }

    #[test]
    fn confidence_clamped_into_unit_interval() {
        let merged = vec![CandidateRef {
            confidence_score: Some(1.7),
            ..CandidateRef::default()
        }];
        let output = assemble_final_output(&merged, MergeStats::default(), ctx(""));
        assert_eq!(output.references[0].confidence_score, 1.0);
    }

    #[test]
    fn summary_counts_by_bucket() {
        let merged = vec![
            CandidateRef {
                document_type: Some("CIRCULAR".into()),
                confidence_score: Some(0.95),
                page_numbers: vec![1, 2],
                ..cand("A", Some("N1"))
            },
            CandidateRef {
                document_type: Some("ACT".into()),
                confidence_score: Some(0.75),
                page_numbers: vec![2, 4],
                ..cand("B", Some("N2"))
            },
            CandidateRef {
                document_type: Some("CIRCULAR".into()),
                confidence_score: Some(0.5),
                ..cand("C", Some("N3"))
            },
        ];
        let output = assemble_final_output(&merged, MergeStats::default(), ctx(""));
        let s = &output.summary_statistics;
        assert_eq!(s.total_references_found, 3);
        assert_eq!(s.by_document_type.get("CIRCULAR"), Some(&2));
        assert_eq!(s.by_document_type.get("ACT"), Some(&1));
        assert_eq!(s.by_confidence_level.get("high"), Some(&1));
        assert_eq!(s.by_confidence_level.get("medium"), Some(&1));
        assert_eq!(s.by_confidence_level.get("low"), Some(&1));
        assert_eq!(s.page_coverage.pages_with_references, vec![1, 2, 4]);
        assert_eq!(s.page_coverage.total_pages_covered, 3);
    }

    #[test]
    fn metadata_carries_counts_and_version() {
        let output = assemble_final_output(
            &[cand("A", Some("N1"))],
            MergeStats {
                duplicates_removed: 4,
                conflicts_resolved: 0,
            },
            ctx(""),
        );
        let m = &output.processing_metadata;
        assert_eq!(m.pipeline_version, PIPELINE_VERSION);
        assert_eq!(m.track_a_references_found, 3);
        assert_eq!(m.track_b_references_found, 2);
        assert_eq!(m.merged_count, 1);
        assert_eq!(m.duplicates_removed, 4);
        assert_eq!(m.conflicts_resolved, 0);
        assert_eq!(m.models_used.get("consensus").map(String::as_str), Some("gemini-2.0-flash"));
    }

    #[test]
    fn empty_source_text_uses_fallback_identity() {
        let output = assemble_final_output(&[], MergeStats::default(), ctx(""));
        assert_eq!(output.source_document.filename, "circular.pdf");
        assert_eq!(output.source_document.sebi_reference_number, "Unknown");
        assert_eq!(output.source_document.total_pages, 1);
    }

    #[test]
    fn timestamp_is_iso_utc_shaped() {
        let ts = utc_timestamp();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_days_to_ymd_known_dates() {
        assert_eq!(days_to_ymd(0), (1970, 1, 1));
        // 2000-01-01 is day 10957
        assert_eq!(days_to_ymd(10957), (2000, 1, 1));
        // 2024-02-15 is day 19768
        assert_eq!(days_to_ymd(19768), (2024, 2, 15));
    }

    #[test]
    fn serialized_output_preserves_unicode() {
        let merged = vec![cand("Règlement général de l'AMF", Some("N1"))];
        let output = assemble_final_output(&merged, MergeStats::default(), ctx(""));
        let json = serde_json::to_string_pretty(&output).unwrap();
        assert!(json.contains("Règlement général"));
    }
}
