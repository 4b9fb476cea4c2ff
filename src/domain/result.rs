//! Attribution output types.

use serde::{Deserialize, Serialize};

use super::character::CanonicalCharacter;

/// A character's share of the total score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub character: CanonicalCharacter,
    pub score: f64,
}

/// A supporting neighbor shown alongside a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub character: CanonicalCharacter,
    pub text: String,
    /// Raw retrieval distance; absent for catchphrase matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Final output of one attribution query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionResult {
    /// Predicted character, or none when there is no evidence or the
    /// confidence is below the threshold
    pub prediction: Option<CanonicalCharacter>,
    /// Share of the total score held by the top character, in [0, 1]
    pub confidence: f64,
    /// Normalized scores, highest first
    #[serde(alias = "all_scores")]
    pub scores: Vec<ScoreEntry>,
    /// Up to five supporting neighbors in retrieval order
    pub evidence: Vec<EvidenceEntry>,
    /// Which path produced the result ("catchphrase" or a weighting method)
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AttributionResult {
    /// Result for a query with no usable evidence
    pub fn no_evidence(method: impl Into<String>) -> Self {
        Self {
            prediction: None,
            confidence: 0.0,
            scores: Vec::new(),
            evidence: Vec::new(),
            method: method.into(),
            reason: Some("No valid character evidence found".to_string()),
        }
    }

    /// Normalized score for one character (0.0 when absent)
    pub fn score_for(&self, character: CanonicalCharacter) -> f64 {
        self.scores
            .iter()
            .find(|entry| entry.character == character)
            .map(|entry| entry.score)
            .unwrap_or(0.0)
    }

    /// The top-scoring character, whether or not it cleared the threshold
    pub fn leading_character(&self) -> Option<CanonicalCharacter> {
        self.scores.first().map(|entry| entry.character)
    }
}
