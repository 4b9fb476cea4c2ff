//! Literal catchphrase override.
//!
//! Signature lines are attributed directly, without retrieval. Rules are
//! checked in table order and the first substring match wins.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::domain::{AttributionResult, CanonicalCharacter, EvidenceEntry, ScoreEntry};

/// Value of `AttributionResult::method` for catchphrase matches
pub const CATCHPHRASE_METHOD: &str = "catchphrase";

/// One signature phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchphraseRule {
    /// Lower-case substring to look for
    pub phrase: String,
    pub character: CanonicalCharacter,
    /// Fixed confidence in (0, 1]
    pub confidence: f64,
}

impl CatchphraseRule {
    pub fn new(phrase: impl Into<String>, character: CanonicalCharacter, confidence: f64) -> Self {
        Self {
            phrase: phrase.into(),
            character,
            confidence,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidCatchphrase {
            phrase: self.phrase.clone(),
            reason: reason.to_string(),
        };

        if self.phrase.trim().is_empty() {
            return Err(invalid("phrase is empty"));
        }
        if self.phrase != self.phrase.to_lowercase() {
            return Err(invalid("phrase must be lower-case"));
        }
        if !(self.confidence > 0.0 && self.confidence <= 1.0) {
            return Err(invalid("confidence must be in (0, 1]"));
        }
        Ok(())
    }
}

/// Built-in signature lines
pub fn builtin_rules() -> Vec<CatchphraseRule> {
    vec![
        CatchphraseRule::new("bazinga", CanonicalCharacter::Sheldon, 0.95),
        CatchphraseRule::new("soft kitty, warm kitty", CanonicalCharacter::Sheldon, 0.9),
        CatchphraseRule::new("knock, knock, knock", CanonicalCharacter::Sheldon, 0.9),
        CatchphraseRule::new("fun with flags", CanonicalCharacter::Sheldon, 0.9),
    ]
}

/// Ordered catchphrase table
#[derive(Debug, Clone)]
pub struct CatchphraseMatcher {
    rules: Vec<CatchphraseRule>,
}

impl Default for CatchphraseMatcher {
    fn default() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }
}

impl CatchphraseMatcher {
    /// Matcher over exactly these rules, in this order
    pub fn new(rules: Vec<CatchphraseRule>) -> Result<Self, ConfigError> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    /// Built-in rules followed by `extra`
    pub fn with_extra(extra: Vec<CatchphraseRule>) -> Result<Self, ConfigError> {
        let mut rules = builtin_rules();
        rules.extend(extra);
        Self::new(rules)
    }

    pub fn rules(&self) -> &[CatchphraseRule] {
        &self.rules
    }

    /// First rule whose phrase occurs in the query
    pub fn find(&self, query: &str) -> Option<&CatchphraseRule> {
        let query = query.trim().to_lowercase();
        self.rules.iter().find(|rule| query.contains(&rule.phrase))
    }

    /// Terminal result for a catchphrase query, or `None` to fall through
    /// to retrieval
    pub fn match_query(&self, query: &str) -> Option<AttributionResult> {
        let rule = self.find(query)?;

        Some(AttributionResult {
            prediction: Some(rule.character),
            confidence: rule.confidence,
            scores: vec![ScoreEntry {
                character: rule.character,
                score: rule.confidence,
            }],
            evidence: vec![EvidenceEntry {
                character: rule.character,
                text: rule.phrase.clone(),
                distance: None,
            }],
            method: CATCHPHRASE_METHOD.to_string(),
            reason: None,
        })
    }
}
