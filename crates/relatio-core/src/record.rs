//! Normalization of loosely-typed candidate records.
//!
//! The upstream extraction tracks return JSON objects with inconsistent key
//! names (`title` vs `referenced_document_title`, `cite` vs
//! `exact_citation_text`, ...). Each canonical field resolves through an
//! ordered list of accepted keys; missing fields stay `None` until final
//! assembly applies the documented defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered key aliases per canonical field: primary name first.
const TITLE_KEYS: &[&str] = &["referenced_document_title", "title"];
const NUMBER_KEYS: &[&str] = &["referenced_sebi_number", "sebi_number"];
const DATE_KEYS: &[&str] = &["referenced_date", "date"];
const CITATION_KEYS: &[&str] = &["exact_citation_text", "cite", "text"];
const CONTEXT_KEYS: &[&str] = &["context_paragraph", "context"];
const SECTION_KEYS: &[&str] = &["section_location", "location"];

/// A candidate reference after key normalization but before schema
/// validation. Serializes with the canonical field names, which is also the
/// shape fed to the consensus model prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_document_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_sebi_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_numbers: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_citation_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_paragraph: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_source: Option<String>,
}

impl CandidateRef {
    /// Coerce one loosely-typed JSON object into the canonical shape.
    /// Non-object values normalize to an all-empty record.
    pub fn from_value(value: &Value) -> Self {
        Self {
            referenced_document_title: lookup_str(value, TITLE_KEYS),
            referenced_sebi_number: lookup_str(value, NUMBER_KEYS),
            referenced_date: lookup_str(value, DATE_KEYS),
            document_type: lookup_str(value, &["document_type"]),
            relationship_type: lookup_str(value, &["relationship_type"]),
            page_numbers: lookup_pages(value),
            exact_citation_text: lookup_str(value, CITATION_KEYS),
            context_paragraph: lookup_str(value, CONTEXT_KEYS),
            section_location: lookup_str(value, SECTION_KEYS),
            confidence_score: lookup_f64(value, &["confidence_score"]),
            extraction_source: lookup_str(value, &["extraction_source"]),
        }
    }
}

/// Normalize a whole track payload. Accepts either a bare array of records
/// or an object wrapping the array under a `references` key.
pub fn records_from_value(value: &Value) -> Vec<CandidateRef> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("references")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    items.iter().map(CandidateRef::from_value).collect()
}

/// First key whose value is a non-empty string (or a number, stringified).
fn lookup_str(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match value.get(key) {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn lookup_f64(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match value.get(key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(f) = s.trim().parse::<f64>() {
                    return Some(f);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerce page entries to integers; non-numeric entries are dropped
/// silently. Positivity is enforced later at schema validation.
fn lookup_pages(value: &Value) -> Vec<u32> {
    let Some(items) = value.get("page_numbers").and_then(Value::as_array) else {
        return vec![];
    };
    items
        .iter()
        .filter_map(|p| match p {
            Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
            Value::String(s) => {
                let t = s.trim();
                if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) {
                    t.parse().ok()
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect()
}
