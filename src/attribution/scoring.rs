//! Neighbor weighting and per-character score accumulation.
//!
//! Each weighting method is a closed enum tag with one [`Weighting`] handler.
//! Method names are parsed once, at configuration time; an unknown name is a
//! [`ConfigError`], never a silent fallback.
//!
//! | method | weight at rank `r`, distance `d` |
//! |---|---|
//! | `inverse_distance` | `1 / (d + ε)` |
//! | `exponential` | `exp(-d)` |
//! | `rank_based` | `1 / (r + 1)` |
//! | `reciprocal_rank_fusion` | `1 / (K + r)` |
//! | `voting` | `1` for the top `vote_k`, then normalized to sum to 1 |
//! | `mmr` | MMR re-rank to `mmr_k`, then `1 / (K + r)` over the new order |
//!
//! Ranks are 0-based positions among the neighbors that survived the
//! allowed-character filter.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::corpus::word_tokens;
use crate::domain::{CanonicalCharacter, RetrievedNeighbor, ScoreEntry};

pub const DEFAULT_EPSILON: f64 = 1e-6;
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Weighting method tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMethod {
    InverseDistance,
    Exponential,
    RankBased,
    ReciprocalRankFusion,
    Voting,
    Mmr,
}

impl WeightingMethod {
    pub const ALL: [WeightingMethod; 6] = [
        Self::InverseDistance,
        Self::Exponential,
        Self::RankBased,
        Self::ReciprocalRankFusion,
        Self::Voting,
        Self::Mmr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InverseDistance => "inverse_distance",
            Self::Exponential => "exponential",
            Self::RankBased => "rank_based",
            Self::ReciprocalRankFusion => "reciprocal_rank_fusion",
            Self::Voting => "voting",
            Self::Mmr => "mmr",
        }
    }

    /// The handler for this tag
    pub fn handler(&self, params: &ScoringParams) -> Box<dyn Weighting> {
        match self {
            Self::InverseDistance => Box::new(InverseDistance {
                epsilon: params.epsilon,
            }),
            Self::Exponential => Box::new(Exponential),
            Self::RankBased => Box::new(RankBased),
            Self::ReciprocalRankFusion => Box::new(ReciprocalRankFusion { k: params.rrf_k }),
            Self::Voting => Box::new(Voting {
                top_k: params.vote_k,
            }),
            Self::Mmr => Box::new(MaximalMarginalRelevance {
                lambda: params.mmr_lambda,
                top_k: params.mmr_k,
                rrf_k: params.rrf_k,
            }),
        }
    }
}

impl fmt::Display for WeightingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightingMethod {
    type Err = ConfigError;

    /// Accepts the snake_case name, with `-` allowed in place of `_`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == name)
            .ok_or_else(|| ConfigError::UnknownMethod {
                name: s.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|m| m.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Tunable scoring parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    /// Added to distances before inversion
    pub epsilon: f64,
    /// Rank offset for reciprocal rank fusion
    pub rrf_k: f64,
    /// Neighbors that vote under `voting`
    pub vote_k: usize,
    /// Relevance/diversity balance for `mmr` (1.0 = pure relevance)
    pub mmr_lambda: f64,
    /// Neighbors kept after MMR re-ranking
    pub mmr_k: usize,
    /// Multiplier for main-cast weights on short queries; `None` disables
    pub short_query_boost: Option<f64>,
    /// Queries with at most this many tokens count as short
    pub short_query_tokens: usize,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            rrf_k: DEFAULT_RRF_K,
            vote_k: 10,
            mmr_lambda: 0.5,
            mmr_k: 10,
            short_query_boost: Some(1.5),
            short_query_tokens: 3,
        }
    }
}

/// A neighbor whose character is in the cast
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub character: CanonicalCharacter,
    pub neighbor: &'a RetrievedNeighbor,
}

/// Per-method weighting handler
pub trait Weighting: Send + Sync + fmt::Debug {
    fn method(&self) -> WeightingMethod;

    /// Candidates that take part in scoring, in rank order
    fn select<'a>(&self, candidates: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        candidates
    }

    /// Weight of the candidate at `rank` with `distance`
    fn weight(&self, rank: usize, distance: f64) -> f64;

    /// Whether accumulated scores are rescaled to sum to 1
    fn normalizes(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct InverseDistance {
    epsilon: f64,
}

impl Weighting for InverseDistance {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::InverseDistance
    }

    fn weight(&self, _rank: usize, distance: f64) -> f64 {
        1.0 / (distance + self.epsilon)
    }
}

#[derive(Debug)]
struct Exponential;

impl Weighting for Exponential {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::Exponential
    }

    fn weight(&self, _rank: usize, distance: f64) -> f64 {
        (-distance).exp()
    }
}

#[derive(Debug)]
struct RankBased;

impl Weighting for RankBased {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::RankBased
    }

    fn weight(&self, rank: usize, _distance: f64) -> f64 {
        1.0 / (rank as f64 + 1.0)
    }
}

#[derive(Debug)]
struct ReciprocalRankFusion {
    k: f64,
}

impl Weighting for ReciprocalRankFusion {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::ReciprocalRankFusion
    }

    fn weight(&self, rank: usize, _distance: f64) -> f64 {
        1.0 / (self.k + rank as f64)
    }
}

#[derive(Debug)]
struct Voting {
    top_k: usize,
}

impl Weighting for Voting {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::Voting
    }

    fn select<'a>(&self, mut candidates: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        candidates.truncate(self.top_k);
        candidates
    }

    fn weight(&self, _rank: usize, _distance: f64) -> f64 {
        1.0
    }

    fn normalizes(&self) -> bool {
        true
    }
}

/// Maximal Marginal Relevance
///
/// MMR = λ × relevance(doc) - (1-λ) × max(similarity(doc, selected)),
/// with relevance `1 / (1 + d)` and similarity the Jaccard overlap of
/// the documents' word sets.
#[derive(Debug)]
struct MaximalMarginalRelevance {
    lambda: f64,
    top_k: usize,
    rrf_k: f64,
}

impl Weighting for MaximalMarginalRelevance {
    fn method(&self) -> WeightingMethod {
        WeightingMethod::Mmr
    }

    fn select<'a>(&self, candidates: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
        let k = self.top_k.min(candidates.len());
        let mut remaining: Vec<(Candidate<'a>, HashSet<String>)> = candidates
            .into_iter()
            .map(|c| {
                let words = word_tokens(&c.neighbor.document.text).collect();
                (c, words)
            })
            .collect();
        let mut selected: Vec<(Candidate<'a>, HashSet<String>)> = Vec::with_capacity(k);

        while selected.len() < k {
            let mut best_idx = 0;
            let mut best_score = f64::NEG_INFINITY;

            for (idx, (candidate, words)) in remaining.iter().enumerate() {
                let relevance = 1.0 / (1.0 + candidate.neighbor.distance);
                let redundancy = selected
                    .iter()
                    .map(|(_, chosen)| jaccard(words, chosen))
                    .fold(0.0, f64::max);
                let score = self.lambda * relevance - (1.0 - self.lambda) * redundancy;

                if score > best_score {
                    best_score = score;
                    best_idx = idx;
                }
            }

            selected.push(remaining.remove(best_idx));
        }

        selected.into_iter().map(|(c, _)| c).collect()
    }

    fn weight(&self, rank: usize, _distance: f64) -> f64 {
        1.0 / (self.rrf_k + rank as f64)
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count() as f64;
    let union = (a.len() + b.len()) as f64 - shared;
    shared / union
}

/// Accumulated weight per character, kept in first-seen order
///
/// Iteration order is the order in which characters first received weight,
/// which is what breaks ties in [`CharacterScores::top`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharacterScores {
    entries: Vec<(CanonicalCharacter, f64)>,
}

impl CharacterScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `weight` to a character's total, inserting it at zero if absent
    pub fn add(&mut self, character: CanonicalCharacter, weight: f64) {
        match self.entries.iter_mut().find(|(c, _)| *c == character) {
            Some((_, total)) => *total += weight,
            None => self.entries.push((character, weight)),
        }
    }

    pub fn get(&self, character: CanonicalCharacter) -> Option<f64> {
        self.entries
            .iter()
            .find(|(c, _)| *c == character)
            .map(|(_, w)| *w)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalCharacter, f64)> + '_ {
        self.entries.iter().copied()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Highest-scoring character; ties go to the first-seen character
    pub fn top(&self) -> Option<(CanonicalCharacter, f64)> {
        let mut best: Option<(CanonicalCharacter, f64)> = None;
        for &(character, weight) in &self.entries {
            match best {
                Some((_, best_weight)) if weight <= best_weight => {}
                _ => best = Some((character, weight)),
            }
        }
        best
    }

    /// Scores rescaled to sum to 1 (all zero when the total is zero)
    pub fn normalized(&self) -> Self {
        let total = self.total();
        let entries = self
            .entries
            .iter()
            .map(|&(c, w)| (c, if total > 0.0 { w / total } else { 0.0 }))
            .collect();
        Self { entries }
    }

    /// Normalized scores sorted highest first (stable for ties)
    pub fn ranked(&self) -> Vec<ScoreEntry> {
        let mut ranked: Vec<ScoreEntry> = self
            .normalized()
            .entries
            .into_iter()
            .map(|(character, score)| ScoreEntry { character, score })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}

/// Neighbors whose character is in the cast, in retrieval order
pub fn eligible(neighbors: &[RetrievedNeighbor]) -> Vec<Candidate<'_>> {
    neighbors
        .iter()
        .filter_map(|neighbor| {
            neighbor
                .document
                .character()
                .map(|character| Candidate { character, neighbor })
        })
        .collect()
}

/// Whether a query is short enough for the main-cast boost
pub fn is_short_query(query: &str, max_tokens: usize) -> bool {
    query.split_whitespace().count() <= max_tokens
}

/// Turns retrieved neighbors into per-character scores
#[derive(Debug)]
pub struct ScoringEngine {
    weighting: Box<dyn Weighting>,
    params: ScoringParams,
}

impl ScoringEngine {
    pub fn new(method: WeightingMethod, params: ScoringParams) -> Self {
        Self {
            weighting: method.handler(&params),
            params,
        }
    }

    pub fn method(&self) -> WeightingMethod {
        self.weighting.method()
    }

    /// Score the neighbors retrieved for `query`
    pub fn score(&self, query: &str, neighbors: &[RetrievedNeighbor]) -> CharacterScores {
        let candidates = self.weighting.select(eligible(neighbors));

        let boost = self
            .params
            .short_query_boost
            .filter(|_| is_short_query(query, self.params.short_query_tokens));

        let mut scores = CharacterScores::new();
        for (rank, candidate) in candidates.iter().enumerate() {
            let mut weight = self.weighting.weight(rank, candidate.neighbor.distance);
            if let Some(boost) = boost {
                if candidate.character.is_main() {
                    weight *= boost;
                }
            }
            scores.add(candidate.character, weight);
        }

        if self.weighting.normalizes() {
            scores.normalized()
        } else {
            scores
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkLayout, Document, DocumentMetadata};

    fn neighbor(character: CanonicalCharacter, text: &str, distance: f64) -> RetrievedNeighbor {
        RetrievedNeighbor::new(Document::new(text, character, ChunkLayout::Line), distance)
    }

    fn stale(label: &str, distance: f64) -> RetrievedNeighbor {
        RetrievedNeighbor::new(
            Document {
                text: "stale".to_string(),
                metadata: DocumentMetadata {
                    character: label.to_string(),
                    layout: ChunkLayout::Line,
                },
            },
            distance,
        )
    }

    fn no_boost() -> ScoringParams {
        ScoringParams {
            short_query_boost: None,
            ..Default::default()
        }
    }

    const LONG_QUERY: &str = "this query is definitely long enough";

    #[test]
    fn test_method_parse() {
        assert_eq!(
            "reciprocal_rank_fusion".parse::<WeightingMethod>().unwrap(),
            WeightingMethod::ReciprocalRankFusion
        );
        assert_eq!(
            "Inverse-Distance".parse::<WeightingMethod>().unwrap(),
            WeightingMethod::InverseDistance
        );
        for method in WeightingMethod::ALL {
            assert_eq!(method.as_str().parse::<WeightingMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_method_fails_fast() {
        let err = "inverse_distanse".parse::<WeightingMethod>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("inverse_distanse"));
        assert!(message.contains("reciprocal_rank_fusion"));
    }

    #[test]
    fn test_distance_weights_strictly_decrease() {
        let params = ScoringParams::default();
        let distances = [0.0, 0.01, 0.3, 0.5, 1.0, 2.5, 10.0];
        for method in [WeightingMethod::InverseDistance, WeightingMethod::Exponential] {
            let handler = method.handler(&params);
            for pair in distances.windows(2) {
                assert!(
                    handler.weight(0, pair[0]) > handler.weight(0, pair[1]),
                    "{} not decreasing at {:?}",
                    method,
                    pair
                );
            }
        }
    }

    #[test]
    fn test_rank_weights() {
        let params = ScoringParams::default();
        let rank = WeightingMethod::RankBased.handler(&params);
        assert_eq!(rank.weight(0, 9.0), 1.0);
        assert_eq!(rank.weight(3, 0.0), 0.25);

        let rrf = WeightingMethod::ReciprocalRankFusion.handler(&params);
        assert_eq!(rrf.weight(0, 0.0), 1.0 / 60.0);
        assert_eq!(rrf.weight(4, 0.0), 1.0 / 64.0);
    }

    #[test]
    fn test_inverse_distance_zero_distance() {
        let handler = WeightingMethod::InverseDistance.handler(&ScoringParams::default());
        assert!(handler.weight(0, 0.0).is_finite());
    }

    #[test]
    fn test_accumulates_across_neighbors() {
        let engine = ScoringEngine::new(WeightingMethod::RankBased, no_boost());
        let neighbors = vec![
            neighbor(CanonicalCharacter::Leonard, "a", 0.1),
            neighbor(CanonicalCharacter::Penny, "b", 0.2),
            neighbor(CanonicalCharacter::Penny, "c", 0.3),
            neighbor(CanonicalCharacter::Penny, "d", 0.4),
        ];

        let scores = engine.score(LONG_QUERY, &neighbors);
        assert_eq!(scores.get(CanonicalCharacter::Leonard), Some(1.0));
        let penny = scores.get(CanonicalCharacter::Penny).unwrap();
        assert!((penny - (0.5 + 1.0 / 3.0 + 0.25)).abs() < 1e-12);
        assert_eq!(scores.top().unwrap().0, CanonicalCharacter::Penny);
    }

    #[test]
    fn test_stale_characters_are_dropped_before_ranking() {
        let engine = ScoringEngine::new(WeightingMethod::RankBased, no_boost());
        let neighbors = vec![
            stale("Kripke", 0.05),
            neighbor(CanonicalCharacter::Howard, "a", 0.1),
        ];

        let scores = engine.score(LONG_QUERY, &neighbors);
        assert_eq!(scores.len(), 1);
        // Howard is rank 0 once the stale neighbor is gone
        assert_eq!(scores.get(CanonicalCharacter::Howard), Some(1.0));
    }

    #[test]
    fn test_voting_top_k_normalized() {
        let params = ScoringParams {
            vote_k: 3,
            ..no_boost()
        };
        let engine = ScoringEngine::new(WeightingMethod::Voting, params);
        let neighbors = vec![
            neighbor(CanonicalCharacter::Raj, "a", 0.1),
            neighbor(CanonicalCharacter::Howard, "b", 0.2),
            neighbor(CanonicalCharacter::Raj, "c", 0.3),
            neighbor(CanonicalCharacter::Howard, "d", 0.4),
            neighbor(CanonicalCharacter::Howard, "e", 0.5),
        ];

        let scores = engine.score(LONG_QUERY, &neighbors);
        let raj = scores.get(CanonicalCharacter::Raj).unwrap();
        let howard = scores.get(CanonicalCharacter::Howard).unwrap();
        assert!((raj - 2.0 / 3.0).abs() < 1e-12);
        assert!((howard - 1.0 / 3.0).abs() < 1e-12);
        assert!((scores.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_query_boost_breaks_tie() {
        // Equal raw similarity; the non-main character is seen first
        let neighbors = vec![
            neighbor(CanonicalCharacter::MaryCooper, "that's my spot", 0.5),
            neighbor(CanonicalCharacter::Sheldon, "that's my spot", 0.5),
        ];

        let plain = ScoringEngine::new(WeightingMethod::InverseDistance, no_boost());
        let scores = plain.score("spot", &neighbors);
        assert_eq!(scores.top().unwrap().0, CanonicalCharacter::MaryCooper);

        let boosted = ScoringEngine::new(WeightingMethod::InverseDistance, ScoringParams::default());
        let scores = boosted.score("spot", &neighbors);
        assert_eq!(scores.top().unwrap().0, CanonicalCharacter::Sheldon);
        let ratio = scores.get(CanonicalCharacter::Sheldon).unwrap()
            / scores.get(CanonicalCharacter::MaryCooper).unwrap();
        assert!((ratio - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_boost_skipped_for_long_queries() {
        let neighbors = vec![
            neighbor(CanonicalCharacter::MaryCooper, "x", 0.5),
            neighbor(CanonicalCharacter::Sheldon, "y", 0.5),
        ];
        let engine = ScoringEngine::new(WeightingMethod::InverseDistance, ScoringParams::default());
        let scores = engine.score(LONG_QUERY, &neighbors);
        assert_eq!(
            scores.get(CanonicalCharacter::MaryCooper),
            scores.get(CanonicalCharacter::Sheldon)
        );
    }

    #[test]
    fn test_mmr_prefers_diverse_documents() {
        let params = ScoringParams {
            mmr_k: 2,
            mmr_lambda: 0.5,
            ..no_boost()
        };
        let engine = ScoringEngine::new(WeightingMethod::Mmr, params);
        let neighbors = vec![
            neighbor(CanonicalCharacter::Sheldon, "the thermostat is set to 71 degrees", 0.10),
            neighbor(CanonicalCharacter::Sheldon, "the thermostat is set to 71 degrees", 0.11),
            neighbor(CanonicalCharacter::Leonard, "we are going to the cheesecake factory", 0.15),
        ];

        let scores = engine.score(LONG_QUERY, &neighbors);
        // The duplicate is displaced by the diverse Leonard document
        assert_eq!(scores.len(), 2);
        assert_eq!(scores.get(CanonicalCharacter::Sheldon), Some(1.0 / 60.0));
        assert_eq!(scores.get(CanonicalCharacter::Leonard), Some(1.0 / 61.0));
    }

    #[test]
    fn test_scores_top_tie_goes_to_first_seen() {
        let mut scores = CharacterScores::new();
        scores.add(CanonicalCharacter::Amy, 2.0);
        scores.add(CanonicalCharacter::Bernadette, 1.0);
        scores.add(CanonicalCharacter::Bernadette, 1.0);
        assert_eq!(scores.top(), Some((CanonicalCharacter::Amy, 2.0)));
    }

    #[test]
    fn test_ranked_is_normalized_and_sorted() {
        let mut scores = CharacterScores::new();
        scores.add(CanonicalCharacter::Stuart, 1.0);
        scores.add(CanonicalCharacter::Penny, 3.0);

        let ranked = scores.ranked();
        assert_eq!(ranked[0].character, CanonicalCharacter::Penny);
        assert!((ranked[0].score - 0.75).abs() < 1e-12);
        assert!((ranked.iter().map(|e| e.score).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_neighbors() {
        let engine = ScoringEngine::new(WeightingMethod::ReciprocalRankFusion, ScoringParams::default());
        assert!(engine.score("spot", &[]).is_empty());
    }
}
