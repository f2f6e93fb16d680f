use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod assemble;
pub mod config_file;
pub mod consensus;
pub mod dedup;
pub mod matching;
pub mod metadata;
pub mod model;
pub mod pages;
pub mod record;
pub mod repair;

// Re-export for convenience
pub use assemble::assemble_final_output;
pub use consensus::{ConsensusConfig, MergeOutcome, MergePath, merge_tracks, merge_with_rules};
pub use dedup::{MergeStats, deduplicate};
pub use record::{CandidateRef, records_from_value};
pub use repair::repair_json;

/// Pipeline version stamped into every output document.
pub const PIPELINE_VERSION: &str = "1.0.0";

/// Type of the referenced regulatory instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Circular,
    Act,
    Regulation,
    Guideline,
    Notification,
    Other,
}

impl DocumentType {
    /// Map a raw extracted value onto the enumeration. Unknown values become
    /// `Other` rather than failing the record.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_uppercase().replace(' ', "_").as_str() {
            "CIRCULAR" => Self::Circular,
            "ACT" => Self::Act,
            "REGULATION" => Self::Regulation,
            "GUIDELINE" => Self::Guideline,
            "NOTIFICATION" => Self::Notification,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circular => "CIRCULAR",
            Self::Act => "ACT",
            Self::Regulation => "REGULATION",
            Self::Guideline => "GUIDELINE",
            Self::Notification => "NOTIFICATION",
            Self::Other => "OTHER",
        }
    }
}

/// How the source circular relates to the referenced document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Supersedes,
    Amends,
    Repeals,
    RefersTo,
    Clarifies,
    DerivesFrom,
}

impl RelationshipType {
    /// Unknown values become `RefersTo`, the weakest relationship.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_uppercase().replace(' ', "_").as_str() {
            "SUPERSEDES" => Self::Supersedes,
            "AMENDS" => Self::Amends,
            "REPEALS" => Self::Repeals,
            "CLARIFIES" => Self::Clarifies,
            "DERIVES_FROM" => Self::DerivesFrom,
            _ => Self::RefersTo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supersedes => "SUPERSEDES",
            Self::Amends => "AMENDS",
            Self::Repeals => "REPEALS",
            Self::RefersTo => "REFERS_TO",
            Self::Clarifies => "CLARIFIES",
            Self::DerivesFrom => "DERIVES_FROM",
        }
    }
}

/// Which extraction track produced a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtractionSource {
    Both,
    TrackA,
    TrackB,
}

impl ExtractionSource {
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_uppercase().replace(' ', "_").as_str() {
            "TRACK_A" => Self::TrackA,
            "TRACK_B" => Self::TrackB,
            _ => Self::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Both => "BOTH",
            Self::TrackA => "TRACK_A",
            Self::TrackB => "TRACK_B",
        }
    }
}

/// Overall processing completion status for one document run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Completed,
    Partial,
    Failed,
}

/// A single validated cross-reference to another regulatory document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Unique within a document, `REF001..REFn` after final renumbering.
    pub reference_id: String,
    pub referenced_document_title: String,
    pub referenced_sebi_number: Option<String>,
    pub referenced_date: Option<String>,
    pub document_type: DocumentType,
    pub relationship_type: RelationshipType,
    /// Sorted, deduplicated, every element > 0.
    pub page_numbers: Vec<u32>,
    pub exact_citation_text: String,
    pub context_paragraph: String,
    pub section_location: String,
    pub confidence_score: f64,
    pub extraction_source: ExtractionSource,
}

/// Metadata about the source circular being processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub filename: String,
    pub circular_title: String,
    pub sebi_reference_number: String,
    pub date_issued: Option<String>,
    pub total_pages: u32,
    /// UTC ISO-8601, assigned at assembly time.
    pub processing_timestamp: String,
}

/// Aggregated statistics over the final reference list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_references_found: usize,
    pub by_document_type: BTreeMap<String, usize>,
    pub by_relationship_type: BTreeMap<String, usize>,
    /// high (>0.9), medium (0.7-0.9), low (<0.7)
    pub by_confidence_level: BTreeMap<String, usize>,
    pub by_extraction_source: BTreeMap<String, usize>,
    pub page_coverage: PageCoverage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageCoverage {
    pub pages_with_references: Vec<u32>,
    pub total_pages_covered: usize,
}

/// Metadata about the pipeline execution itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub pipeline_version: String,
    pub models_used: BTreeMap<String, String>,
    pub processing_time_seconds: u64,
    pub track_a_references_found: usize,
    pub track_b_references_found: usize,
    pub merged_count: usize,
    pub duplicates_removed: usize,
    /// Reserved for field-level conflict detection; currently always 0.
    pub conflicts_resolved: usize,
    pub validation_status: ValidationStatus,
    pub warnings: Vec<String>,
}

/// Complete output document, one per source circular.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalOutput {
    pub source_document: SourceDocument,
    pub references: Vec<Reference>,
    pub summary_statistics: SummaryStatistics,
    pub processing_metadata: ProcessingMetadata,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("consensus model error: {0}")]
    Model(String),
}
