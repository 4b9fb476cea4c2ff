//! Dialogue text cleaning and the transcript cleaning pipeline.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::normalizer::CharacterNormalizer;
use super::transcript::RawRow;
use crate::domain::DialogueLine;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(.*?\)").expect("valid parenthesis regex"));

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("valid bracket regex"));

/// Words that carry no speaker signal on their own
pub const FILLER_WORDS: &[&str] = &["uh", "um", "yeah", "okay", "ok", "oh", "hmm", "huh"];

const MIN_TOKENS: usize = 3;

/// Strip `(...)` and `[...]` annotations and collapse whitespace
///
/// Returns `None` when nothing is left.
pub fn clean_text(raw: &str) -> Option<String> {
    let text = PARENTHESIZED.replace_all(raw, "");
    let text = BRACKETED.replace_all(&text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Whether a line is too short or too generic to attribute
///
/// True for fewer than three tokens, or when every token (ignoring trailing
/// `. , ! ? …`) is a filler word.
pub fn is_low_information(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    if tokens.len() < MIN_TOKENS {
        return true;
    }

    tokens.iter().all(|token| {
        let word = token.trim_end_matches(['.', ',', '!', '?', '…']);
        FILLER_WORDS.contains(&word)
    })
}

/// Lower-case word tokens (letters, digits and inner apostrophes)
pub fn word_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|token| token.trim_matches('\'').to_lowercase())
        .filter(|token| !token.is_empty())
}

/// Why a transcript row was left out of the cleaned corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Row is a scene marker, not dialogue
    SceneMarker,
    /// Speaker label missing, banned, a stage direction, or unknown
    UnknownSpeaker,
    /// Text empty after stripping annotations
    EmptyText,
    /// Too short or all filler words
    LowInformation,
}

/// Per-reason counts for one cleaning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub total_rows: usize,
    pub kept: usize,
    pub scene_markers: usize,
    pub unknown_speaker: usize,
    pub empty_text: usize,
    pub low_information: usize,
}

impl CleaningReport {
    fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::SceneMarker => self.scene_markers += 1,
            RejectReason::UnknownSpeaker => self.unknown_speaker += 1,
            RejectReason::EmptyText => self.empty_text += 1,
            RejectReason::LowInformation => self.low_information += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.total_rows - self.kept
    }
}

/// Turns raw transcript rows into attributed, cleaned dialogue lines
#[derive(Debug, Clone, Default)]
pub struct DialoguePreprocessor {
    normalizer: CharacterNormalizer,
}

impl DialoguePreprocessor {
    pub fn new(normalizer: CharacterNormalizer) -> Self {
        Self { normalizer }
    }

    /// Clean and attribute one row
    pub fn process(&self, row: &RawRow) -> Result<DialogueLine, RejectReason> {
        let label = row.character.as_deref().unwrap_or_default();
        if label.trim() == "Scene" {
            return Err(RejectReason::SceneMarker);
        }

        let character = self
            .normalizer
            .normalize(label)
            .ok_or(RejectReason::UnknownSpeaker)?;

        let text = row
            .text
            .as_deref()
            .and_then(clean_text)
            .ok_or(RejectReason::EmptyText)?;

        if is_low_information(&text) {
            return Err(RejectReason::LowInformation);
        }

        Ok(DialogueLine::new(character, text))
    }

    /// Clean a whole transcript, preserving row order
    pub fn clean<I>(&self, rows: I) -> (Vec<DialogueLine>, CleaningReport)
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut report = CleaningReport::default();
        let mut lines = Vec::new();

        for row in rows {
            report.total_rows += 1;
            match self.process(&row) {
                Ok(line) => {
                    report.kept += 1;
                    lines.push(line);
                }
                Err(reason) => {
                    debug!(?reason, label = ?row.character, "Dropping transcript row");
                    report.record(reason);
                }
            }
        }

        info!(
            total = report.total_rows,
            kept = report.kept,
            scene_markers = report.scene_markers,
            unknown_speaker = report.unknown_speaker,
            empty_text = report.empty_text,
            low_information = report.low_information,
            variants = self.normalizer.variant_count(),
            "Transcript cleaned"
        );

        (lines, report)
    }
}
