//! Final attribution decision.
//!
//! Picks the top character, computes its share of the total score, applies
//! the minimum-confidence gate and collects supporting evidence.

use crate::domain::{AttributionResult, EvidenceEntry, RetrievedNeighbor};

use super::scoring::{eligible, CharacterScores};

/// Maximum evidence entries per result
pub const MAX_EVIDENCE: usize = 5;

/// Maximum characters of document text shown per evidence entry
pub const SNIPPET_CHARS: usize = 200;

/// Render the attribution for a scored query
///
/// Below-threshold results keep their confidence and scores but carry no
/// prediction. An empty score map is a normal "no evidence" result.
pub fn decide(
    neighbors: &[RetrievedNeighbor],
    scores: &CharacterScores,
    min_confidence: f64,
    method: &str,
) -> AttributionResult {
    let Some((predicted, top_score)) = scores.top() else {
        return AttributionResult::no_evidence(method);
    };

    let total = scores.total();
    let confidence = if total > 0.0 {
        (top_score / total).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let evidence = collect_evidence(neighbors);

    let (prediction, reason) = if confidence < min_confidence {
        (
            None,
            Some(format!(
                "Confidence {:.3} is below the minimum of {:.3}",
                confidence, min_confidence
            )),
        )
    } else {
        (Some(predicted), None)
    };

    AttributionResult {
        prediction,
        confidence,
        scores: scores.ranked(),
        evidence,
        method: method.to_string(),
        reason,
    }
}

/// First eligible neighbors in retrieval order
pub fn collect_evidence(neighbors: &[RetrievedNeighbor]) -> Vec<EvidenceEntry> {
    eligible(neighbors)
        .into_iter()
        .take(MAX_EVIDENCE)
        .map(|candidate| EvidenceEntry {
            character: candidate.character,
            text: snippet(&candidate.neighbor.document.text, SNIPPET_CHARS),
            distance: Some(candidate.neighbor.distance),
        })
        .collect()
}

/// Truncate to `max_chars` characters, marking the cut with "..."
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
