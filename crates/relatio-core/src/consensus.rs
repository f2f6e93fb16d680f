//! Consensus merge of the two extraction tracks.
//!
//! The primary path asks a generative model to reconcile both candidate
//! lists into one. Its output is never trusted structurally: whatever comes
//! back is re-deduplicated locally and page-backfilled. When the model call
//! fails (exhausted retries, unparseable output) the merge degrades to a
//! deterministic rule-based concatenation of both tracks, which cannot fail.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::dedup::{MergeStats, deduplicate};
use crate::model::ConsensusModel;
use crate::pages::backfill_missing_pages;
use crate::CoreError;
use crate::record::CandidateRef;
use crate::repair::repair_json;

const CONSENSUS_PROMPT: &str = "You are a senior regulatory compliance expert.

**GOAL:** Merge and deduplicate references from two AI extraction tracks into ONE final list.

**INPUTS:**
TRACK A: {track_a}
TRACK B: {track_b}

**INSTRUCTIONS:**
1. **Deduplicate:** References to the same document MUST be merged into a single entry.
2. **Select Best Info:** Pick the most complete title, SEBI number, and date.
3. **Combine Pages:** Combine all unique page numbers found.
4. **Merge Context:** Ensure the merged entry has a valid paragraph and citation text.

Return valid JSON: a list of objects matching the standard schema. No commentary.
";

/// Retry policy for the consensus model call.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Which branch produced the merged list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePath {
    /// Model consensus succeeded and its output parsed.
    Model,
    /// Deterministic fallback (model failed or was never attempted).
    Rules,
}

/// Result of a merge, tagged with the branch that produced it.
#[derive(Debug)]
pub struct MergeOutcome {
    pub references: Vec<CandidateRef>,
    pub stats: MergeStats,
    pub path: MergePath,
}

fn build_prompt(track_a: &[CandidateRef], track_b: &[CandidateRef]) -> String {
    let a = serde_json::to_string(track_a).unwrap_or_else(|_| "[]".to_string());
    let b = serde_json::to_string(track_b).unwrap_or_else(|_| "[]".to_string());
    CONSENSUS_PROMPT
        .replace("{track_a}", &a)
        .replace("{track_b}", &b)
}

/// Call the model, retrying with exponential backoff on any error. Waits
/// 4s, 8s, 16s, 32s between the five attempts (capped at 60s); the last
/// error propagates.
async fn generate_with_retry(
    model: &dyn ConsensusModel,
    prompt: &str,
    config: &ConsensusConfig,
) -> Result<String, CoreError> {
    let mut delay = config.base_delay;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match model.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(err) if attempt < config.attempts => {
                warn!(
                    attempt,
                    max = config.attempts,
                    wait_secs = delay.as_secs(),
                    "consensus call failed: {err}"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Parse the model's response into candidate records. Tries a direct parse,
/// then one repair pass. `Err` means unparseable even after repair; the
/// caller falls back to the rule-based merge.
fn parse_merged(text: &str) -> Result<Vec<CandidateRef>, CoreError> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => {
            let repaired = repair_json(text);
            serde_json::from_str(&repaired)
                .map_err(|e| CoreError::Model(format!("unparseable consensus output: {e}")))?
        }
    };
    Ok(extract_list(&value))
}

/// Accept a bare array, or an object wrapping the array under
/// `merged_references`, `references`, or a sole key. Anything else is an
/// empty list.
fn extract_list(value: &Value) -> Vec<CandidateRef> {
    let items: Option<&Vec<Value>> = match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("merged_references")
            .or_else(|| map.get("references"))
            .or_else(|| {
                if map.len() == 1 {
                    map.values().next()
                } else {
                    None
                }
            })
            .and_then(Value::as_array),
        _ => None,
    };
    items
        .map(|items| items.iter().map(CandidateRef::from_value).collect())
        .unwrap_or_default()
}

/// Primary merge: model consensus with retry, local dedup, page backfill.
/// Never errors; failure of the model path degrades to [`merge_with_rules`].
pub async fn merge_tracks(
    model: &dyn ConsensusModel,
    track_a: &[CandidateRef],
    track_b: &[CandidateRef],
    source_text: &str,
    config: &ConsensusConfig,
) -> MergeOutcome {
    let prompt = build_prompt(track_a, track_b);

    let raw = match generate_with_retry(model, &prompt, config).await {
        Ok(text) => match parse_merged(&text) {
            Ok(refs) => refs,
            Err(err) => {
                warn!("consensus output rejected, using rule-based merge: {err}");
                return merge_with_rules(track_a, track_b, source_text);
            }
        },
        Err(err) => {
            warn!("consensus call exhausted retries, using rule-based merge: {err}");
            return merge_with_rules(track_a, track_b, source_text);
        }
    };

    info!(count = raw.len(), "consensus model returned merged entries");
    let (mut references, stats) = deduplicate(raw);
    if !source_text.is_empty() {
        backfill_missing_pages(&mut references, source_text);
    }
    MergeOutcome {
        references,
        stats,
        path: MergePath::Model,
    }
}

/// Deterministic fallback: concatenate both tracks, deduplicate, backfill.
pub fn merge_with_rules(
    track_a: &[CandidateRef],
    track_b: &[CandidateRef],
    source_text: &str,
) -> MergeOutcome {
    let all: Vec<CandidateRef> = track_a.iter().chain(track_b.iter()).cloned().collect();
    let (mut references, stats) = deduplicate(all);
    if !source_text.is_empty() {
        backfill_missing_pages(&mut references, source_text);
    }
    MergeOutcome {
        references,
        stats,
        path: MergePath::Rules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock::{MockModel, MockResponse};
    use serde_json::json;
    use tokio::time::Instant;

    fn cand(title: &str, number: Option<&str>) -> CandidateRef {
        CandidateRef {
            referenced_document_title: Some(title.to_string()),
            referenced_sebi_number: number.map(|n| n.to_string()),
            ..Default::default()
        }
    }

    fn model_json(refs: &[(&str, &str)]) -> String {
        let items: Vec<Value> = refs
            .iter()
            .map(|(t, n)| json!({"referenced_document_title": t, "referenced_sebi_number": n}))
            .collect();
        serde_json::to_string(&items).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn model_success_takes_model_path() {
        let model = MockModel::new(MockResponse::Text(model_json(&[("Circular X", "N1")])));
        let outcome = merge_tracks(
            &model,
            &[cand("Circular X", Some("N1"))],
            &[],
            "",
            &ConsensusConfig::default(),
        )
        .await;
        assert_eq!(outcome.path, MergePath::Model);
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn model_duplicates_are_still_collapsed() {
        let model = MockModel::new(MockResponse::Text(model_json(&[
            ("Circular X", "N1"),
            ("Circular X!", "n-1"),
        ])));
        let outcome = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Model);
        assert_eq!(outcome.references.len(), 1);
        assert_eq!(outcome.stats.duplicates_removed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wrapped_references_key_accepted() {
        let wrapped = format!(r#"{{"merged_references": {}}}"#, model_json(&[("A", "N1")]));
        let model = MockModel::new(MockResponse::Text(wrapped));
        let outcome = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Model);
        assert_eq!(outcome.references.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sole_key_object_accepted() {
        let wrapped = format!(r#"{{"result": {}}}"#, model_json(&[("A", "N1")]));
        let model = MockModel::new(MockResponse::Text(wrapped));
        let outcome = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Model);
        assert_eq!(outcome.references.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_list_payload_coerced_to_empty_model_result() {
        let model = MockModel::new(MockResponse::Text(
            r#"{"status": "ok", "note": "nothing"}"#.into(),
        ));
        let outcome = merge_tracks(
            &model,
            &[cand("Circular X", Some("N1"))],
            &[],
            "",
            &ConsensusConfig::default(),
        )
        .await;
        // Parsed fine, wrong shape: the model path stands, with no entries.
        assert_eq!(outcome.path, MergePath::Model);
        assert!(outcome.references.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_output_repaired_and_used() {
        // Cut off inside the second object at a repairable point.
        let model = MockModel::new(MockResponse::Text(
            r#"[{"referenced_document_title":"A","referenced_sebi_number":"N1"},{"title":"B"#.into(),
        ));
        let outcome = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Model);
        assert_eq!(outcome.references.len(), 2);
        assert_eq!(
            outcome.references[0].referenced_document_title.as_deref(),
            Some("A")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn truncation_unrepairable_mid_key_falls_back_to_rules() {
        // The trim loop stops at the underscore in a half-written key, so
        // the repaired text still fails to parse.
        let model = MockModel::new(MockResponse::Text(
            r#"[{"referenced_document_title":"A"},{"referenced_document_title":"B"#.into(),
        ));
        let a = vec![cand("Circular X", Some("N1"))];
        let outcome = merge_tracks(&model, &a, &[], "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Rules);
        assert_eq!(outcome.references, merge_with_rules(&a, &[], "").references);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_output_falls_back_to_rules() {
        let model = MockModel::new(MockResponse::Text("I could not comply.".into()));
        let a = vec![cand("Circular X", Some("N1"))];
        let b = vec![cand("Circular Y", Some("N2"))];
        let outcome = merge_tracks(&model, &a, &b, "", &ConsensusConfig::default()).await;
        assert_eq!(outcome.path, MergePath::Rules);
        let expected = merge_with_rules(&a, &b, "");
        assert_eq!(outcome.references, expected.references);
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_rules() {
        let model = MockModel::new(MockResponse::Error("503 overloaded".into()));
        let a = vec![cand("Circular X", Some("N1")), cand("Circular X", Some("N1"))];
        let b = vec![cand("Circular Y", Some("N2"))];
        let outcome = merge_tracks(&model, &a, &b, "", &ConsensusConfig::default()).await;
        assert_eq!(model.call_count(), 5);
        assert_eq!(outcome.path, MergePath::Rules);
        assert_eq!(outcome.references.len(), 2);
        assert_eq!(outcome.stats.duplicates_removed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retried_until_success() {
        let model = MockModel::with_sequence(vec![
            MockResponse::Error("timeout".into()),
            MockResponse::Error("timeout".into()),
            MockResponse::Text(model_json(&[("A", "N1")])),
        ]);
        let outcome = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        assert_eq!(model.call_count(), 3);
        assert_eq!(outcome.path, MergePath::Model);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_from_four_seconds() {
        let model = MockModel::new(MockResponse::Error("down".into()));
        let start = Instant::now();
        let _ = merge_tracks(&model, &[], &[], "", &ConsensusConfig::default()).await;
        // Four waits between five attempts: 4 + 8 + 16 + 32 seconds.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_cap_applies() {
        let model = MockModel::new(MockResponse::Error("down".into()));
        let config = ConsensusConfig {
            attempts: 7,
            ..ConsensusConfig::default()
        };
        let start = Instant::now();
        let _ = merge_tracks(&model, &[], &[], "", &config).await;
        // 4 + 8 + 16 + 32 + 60 + 60: the last two waits hit the cap.
        assert_eq!(start.elapsed(), Duration::from_secs(180));
        assert_eq!(model.call_count(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn model_path_backfills_pages() {
        let text = "[PAGE 1] intro [PAGE 4] as per the KYC circular issued earlier";
        let model = MockModel::new(MockResponse::Text(
            r#"[{"referenced_document_title":"KYC Circular","exact_citation_text":"as per the KYC circular"}]"#
                .into(),
        ));
        let outcome = merge_tracks(&model, &[], &[], text, &ConsensusConfig::default()).await;
        assert_eq!(outcome.references[0].page_numbers, vec![4]);
    }

    #[test]
    fn rules_merge_is_deterministic() {
        let a = vec![cand("Circular X", Some("N1"))];
        let b = vec![cand("Circular X", Some("N1")), cand("Circular Y", None)];
        let first = merge_with_rules(&a, &b, "");
        let second = merge_with_rules(&a, &b, "");
        assert_eq!(first.references, second.references);
        assert_eq!(first.path, MergePath::Rules);
        assert_eq!(first.references.len(), 2);
    }

    #[test]
    fn prompt_embeds_both_tracks() {
        let prompt = build_prompt(&[cand("Alpha", Some("N1"))], &[cand("Beta", None)]);
        assert!(prompt.contains("Alpha"));
        assert!(prompt.contains("Beta"));
        assert!(!prompt.contains("{track_a}"));
    }
}
