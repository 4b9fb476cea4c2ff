//! Groups cleaned dialogue into retrievable documents.
//!
//! Lines are grouped per character (in order of each character's first
//! appearance) and never mixed across characters. Within a character, the
//! original line order is preserved.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::domain::{CanonicalCharacter, ChunkLayout, DialogueLine, Document};

/// Windowing strategy for document construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChunkStrategy {
    /// Fixed windows of `chunk_size` lines, consecutive windows sharing
    /// `overlap` lines
    Chunked { chunk_size: usize, overlap: usize },
    /// One document per line, embedding up to `window_size` lines of
    /// context on each side
    Contextual { window_size: usize },
    /// One document per line, no context
    Line,
}

impl ChunkStrategy {
    /// Validated chunked strategy
    pub fn chunked(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        let strategy = Self::Chunked {
            chunk_size,
            overlap,
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn contextual(window_size: usize) -> Self {
        Self::Contextual { window_size }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Chunked {
            chunk_size,
            overlap,
        } = *self
        {
            if chunk_size == 0 {
                return Err(ConfigError::EmptyChunk);
            }
            if overlap >= chunk_size {
                return Err(ConfigError::InvalidOverlap {
                    chunk_size,
                    overlap,
                });
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Chunked { .. } => StrategyKind::Chunked,
            Self::Contextual { .. } => StrategyKind::Contextual,
            Self::Line => StrategyKind::Line,
        }
    }
}

/// Strategy name without parameters (for config and CLI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Chunked,
    Contextual,
    Line,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunked => "chunked",
            Self::Contextual => "contextual",
            Self::Line => "line",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chunked" => Ok(Self::Chunked),
            "contextual" => Ok(Self::Contextual),
            "line" => Ok(Self::Line),
            _ => Err(ConfigError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// Build documents for the whole corpus
pub fn build_documents(lines: &[DialogueLine], strategy: ChunkStrategy) -> Vec<Document> {
    group_by_character(lines)
        .into_iter()
        .flat_map(|(character, texts)| match strategy {
            ChunkStrategy::Chunked {
                chunk_size,
                overlap,
            } => chunked(character, &texts, chunk_size, overlap),
            ChunkStrategy::Contextual { window_size } => contextual(character, &texts, window_size),
            ChunkStrategy::Line => texts
                .iter()
                .map(|text| Document::new(*text, character, ChunkLayout::Line))
                .collect(),
        })
        .collect()
}

/// Per-character line sequences, in order of first appearance
fn group_by_character(lines: &[DialogueLine]) -> Vec<(CanonicalCharacter, Vec<&str>)> {
    let mut groups: Vec<(CanonicalCharacter, Vec<&str>)> = Vec::new();

    for line in lines {
        match groups.iter_mut().find(|(c, _)| *c == line.character) {
            Some((_, texts)) => texts.push(line.text.as_str()),
            None => groups.push((line.character, vec![line.text.as_str()])),
        }
    }

    groups
}

fn chunked(
    character: CanonicalCharacter,
    texts: &[&str],
    chunk_size: usize,
    overlap: usize,
) -> Vec<Document> {
    // A zero step would never terminate; validate() rules it out for
    // configured strategies.
    let step = chunk_size.saturating_sub(overlap).max(1);
    let chunk_size = chunk_size.max(1);

    (0..texts.len())
        .step_by(step)
        .map(|start| {
            let end = (start + chunk_size).min(texts.len());
            let window = &texts[start..end];
            Document::new(
                window.join(" "),
                character,
                ChunkLayout::Chunked {
                    num_lines: window.len(),
                    start_idx: start,
                },
            )
        })
        .collect()
}

fn contextual(character: CanonicalCharacter, texts: &[&str], window_size: usize) -> Vec<Document> {
    texts
        .iter()
        .enumerate()
        .map(|(i, main_line)| {
            let start = i.saturating_sub(window_size);
            let end = i.saturating_add(window_size).saturating_add(1).min(texts.len());
            let context = &texts[start..end];
            Document::new(
                format!("{} {}", main_line, context.join(" ")),
                character,
                ChunkLayout::Contextual {
                    main_line: main_line.to_string(),
                    context_size: context.len(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_for(character: CanonicalCharacter, count: usize) -> Vec<DialogueLine> {
        (0..count)
            .map(|i| DialogueLine::new(character, format!("line{}", i)))
            .collect()
    }

    fn start_and_len(doc: &Document) -> (usize, usize) {
        match doc.metadata.layout {
            ChunkLayout::Chunked {
                num_lines,
                start_idx,
            } => (start_idx, num_lines),
            ref other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_chunked_covers_every_line() {
        let lines = lines_for(CanonicalCharacter::Sheldon, 25);
        let strategy = ChunkStrategy::chunked(10, 3).unwrap();
        let docs = build_documents(&lines, strategy);

        let spans: Vec<(usize, usize)> = docs.iter().map(start_and_len).collect();
        assert_eq!(spans, vec![(0, 10), (7, 10), (14, 10), (21, 4)]);

        for i in 0..25 {
            assert!(
                spans.iter().any(|&(s, n)| s <= i && i < s + n),
                "line {} not covered",
                i
            );
        }
        for pair in spans.windows(2) {
            assert!(pair[1].0 - pair[0].0 <= 7);
        }
    }

    #[test]
    fn test_chunked_text_joins_lines() {
        let lines = lines_for(CanonicalCharacter::Penny, 4);
        let docs = build_documents(&lines, ChunkStrategy::chunked(3, 1).unwrap());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "line0 line1 line2");
        assert_eq!(docs[1].text, "line2 line3");
    }

    #[test]
    fn test_characters_never_mixed() {
        let mut lines = lines_for(CanonicalCharacter::Howard, 3);
        lines.insert(1, DialogueLine::new(CanonicalCharacter::Raj, "raj0"));
        lines.push(DialogueLine::new(CanonicalCharacter::Raj, "raj1"));

        let docs = build_documents(&lines, ChunkStrategy::chunked(5, 2).unwrap());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].character(), Some(CanonicalCharacter::Howard));
        assert_eq!(docs[0].text, "line0 line1 line2");
        assert_eq!(docs[1].character(), Some(CanonicalCharacter::Raj));
        assert_eq!(docs[1].text, "raj0 raj1");
    }

    #[test]
    fn test_contextual_one_document_per_line() {
        let mut lines = lines_for(CanonicalCharacter::Amy, 7);
        lines.extend(lines_for(CanonicalCharacter::Bernadette, 2));

        let docs = build_documents(&lines, ChunkStrategy::contextual(2));
        let amy = docs
            .iter()
            .filter(|d| d.character() == Some(CanonicalCharacter::Amy))
            .count();
        assert_eq!(amy, 7);
        assert_eq!(docs.len(), 9);

        assert_eq!(docs[0].text, "line0 line0 line1 line2");
        match &docs[3].metadata.layout {
            ChunkLayout::Contextual {
                main_line,
                context_size,
            } => {
                assert_eq!(main_line, "line3");
                assert_eq!(*context_size, 5);
            }
            other => panic!("unexpected layout {:?}", other),
        }
        assert_eq!(docs[3].text, "line3 line1 line2 line3 line4 line5");
    }

    #[test]
    fn test_contextual_huge_window_covers_all_lines() {
        let lines = lines_for(CanonicalCharacter::Raj, 3);
        let docs = build_documents(&lines, ChunkStrategy::contextual(usize::MAX));
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].text, "line2 line0 line1 line2");
        for doc in &docs {
            match &doc.metadata.layout {
                ChunkLayout::Contextual { context_size, .. } => assert_eq!(*context_size, 3),
                other => panic!("unexpected layout {:?}", other),
            }
        }
    }

    #[test]
    fn test_line_strategy() {
        let lines = lines_for(CanonicalCharacter::Stuart, 3);
        let docs = build_documents(&lines, ChunkStrategy::Line);
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].text, "line2");
        assert_eq!(docs[2].metadata.layout, ChunkLayout::Line);
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        assert!(matches!(
            ChunkStrategy::chunked(5, 5),
            Err(ConfigError::InvalidOverlap { .. })
        ));
        assert!(matches!(
            ChunkStrategy::chunked(0, 0),
            Err(ConfigError::EmptyChunk)
        ));
    }

    #[test]
    fn test_strategy_kind_parse() {
        assert_eq!("Contextual".parse::<StrategyKind>().unwrap(), StrategyKind::Contextual);
        assert!("sliding".parse::<StrategyKind>().is_err());
    }
}
