//! Query-time attribution.
//!
//! A query first goes through the [`CatchphraseMatcher`]; on a miss the
//! shared index is searched, neighbors are scored by the configured
//! [`WeightingMethod`] and [`decide`] renders the result.
//!
//! Every valid query yields an [`AttributionResult`]. Only index faults
//! surface as errors.

pub mod catchphrase;
pub mod decision;
pub mod scoring;

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::domain::AttributionResult;
use crate::index::IndexContext;

pub use catchphrase::{builtin_rules, CatchphraseMatcher, CatchphraseRule, CATCHPHRASE_METHOD};
pub use decision::{collect_evidence, decide, snippet, MAX_EVIDENCE, SNIPPET_CHARS};
pub use scoring::{CharacterScores, ScoringEngine, ScoringParams, Weighting, WeightingMethod};

/// Default number of neighbors retrieved per query
pub const DEFAULT_K: usize = 20;

/// Default minimum confidence for a prediction
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.25;

/// Rejected attribution request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error("min_confidence must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// Validate a minimum-confidence threshold
pub fn check_threshold(value: f64) -> Result<f64, QueryError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(QueryError::InvalidThreshold(value))
    }
}

/// Attribution engine bound to one index context
#[derive(Debug)]
pub struct Attributor {
    context: Arc<IndexContext>,
    catchphrases: CatchphraseMatcher,
    scorer: ScoringEngine,
    k: usize,
    min_confidence: f64,
}

impl Attributor {
    pub fn new(context: Arc<IndexContext>, scorer: ScoringEngine) -> Self {
        Self {
            context,
            catchphrases: CatchphraseMatcher::default(),
            scorer,
            k: DEFAULT_K,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_catchphrases(mut self, catchphrases: CatchphraseMatcher) -> Self {
        self.catchphrases = catchphrases;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Result<Self, QueryError> {
        self.min_confidence = check_threshold(min_confidence)?;
        Ok(self)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn method(&self) -> WeightingMethod {
        self.scorer.method()
    }

    pub fn context(&self) -> &Arc<IndexContext> {
        &self.context
    }

    /// Attribute one line of dialogue
    ///
    /// `min_confidence` overrides the engine default for this query.
    #[instrument(skip(self), fields(method = %self.scorer.method()))]
    pub async fn attribute(
        &self,
        query: &str,
        min_confidence: Option<f64>,
    ) -> Result<AttributionResult> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery.into());
        }
        let min_confidence = match min_confidence {
            Some(value) => check_threshold(value)?,
            None => self.min_confidence,
        };

        if let Some(result) = self.catchphrases.match_query(query) {
            info!(prediction = ?result.prediction, "Catchphrase match");
            return Ok(result);
        }

        let index = self.context.index().await?;
        let neighbors = index.query(query, self.k).await?;
        debug!(neighbors = neighbors.len(), index = index.name(), "Retrieved neighbors");

        let scores = self.scorer.score(query, &neighbors);
        let result = decide(&neighbors, &scores, min_confidence, self.scorer.method().as_str());

        info!(
            prediction = ?result.prediction,
            confidence = result.confidence,
            "Attribution complete"
        );
        Ok(result)
    }
}
